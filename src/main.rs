//! Asana Coach: streams webcam frames to the pose analysis service and
//! draws the returned feedback over the live view.
//!
//! The render loop never waits on the network. Uploads go through a
//! one-in-flight pump and the overlay always shows whatever analysis
//! last came back.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use opencv::core::{Mat, Point, Scalar, Size};
use opencv::imgproc;

use asana_coach::camera::{encode_snapshot, ThreadedCamera, VideoLooper};
use asana_coach::client::AnalysisClient;
use asana_coach::config::Config;
use asana_coach::hud::{build_hud, PRAISE_MESSAGE};
use asana_coach::overlay::{draw_markers, CoachWindow, OverlayCanvas, ViewRect};
use asana_coach::pump::FramePump;
use asana_coach::session::{FeedbackItem, SessionState};
use asana_coach::speech::Narrator;

const CONFIG_PATH: &str = "coach.toml";

// Instructor picture-in-picture geometry
const INSET_WIDTH: usize = 126;
const INSET_HEIGHT: usize = 108;
const INSET_MARGIN: usize = 10;

// HUD text layout
const HUD_X: i32 = 12;
const HUD_TOP: i32 = 42;
const HUD_LINE_STEP: i32 = 34;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/coach_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

// ---------------------------------------------------------------------------
// Frame composition helpers
// ---------------------------------------------------------------------------

fn fit_frame(frame: &Mat, width: i32, height: i32) -> Result<Mat> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

/// Two-pass text: black underlay for readability, then the foreground.
fn draw_hud_line(mat: &mut Mat, text: &str, y: i32, foreground: Scalar) -> Result<()> {
    imgproc::put_text(
        mat,
        text,
        Point::new(HUD_X, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        Scalar::new(0.0, 0.0, 0.0, 0.0),
        4,
        imgproc::LINE_8,
        false,
    )?;
    imgproc::put_text(
        mat,
        text,
        Point::new(HUD_X, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        foreground,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let pose_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.session.pose_name.clone());

    let logfile = open_log_file()?;
    log!(logfile, "Asana Coach ({})", env!("GIT_VERSION"));
    log!(
        logfile,
        "[config] endpoint={}, pose={}, camera={} {}x{}, upload={} q{}, fps={}",
        config.service.endpoint,
        if pose_name.is_empty() { "(none)" } else { &pose_name },
        config.camera.index,
        config.camera.width,
        config.camera.height,
        config.camera.format,
        config.camera.quality,
        config.app.target_fps,
    );
    if pose_name.is_empty() {
        log!(
            logfile,
            "[session] no pose name configured; frames will not be uploaded"
        );
    }
    println!("Controls: [I] swap instructor view  [Esc] quit");

    // Ctrl-C / TERM flip the flag; the loop notices on the next tick
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let running = Arc::new(AtomicBool::new(true));

    let camera = ThreadedCamera::start(
        config.camera.index,
        config.camera.width,
        config.camera.height,
        Arc::clone(&running),
    )?;
    let (cam_w, cam_h) = camera.resolution();
    log!(logfile, "[camera] {}x{}", cam_w, cam_h);

    let mut instructor = if config.instructor.video.is_empty() {
        None
    } else {
        match VideoLooper::open(Path::new(&config.instructor.video)) {
            Ok(looper) => {
                log!(logfile, "[instructor] playing {}", config.instructor.video);
                Some(looper)
            }
            Err(err) => {
                log!(logfile, "[instructor] disabled: {err:#}");
                None
            }
        }
    };

    let session = SessionState::shared(pose_name.clone());
    let client = Arc::new(AnalysisClient::new(
        &config.service.endpoint,
        &pose_name,
        config.service.timeout(),
    )?);

    // Narration runs on its own thread so slow speech synthesis never
    // stalls drawing. It exits when the pump side hangs up.
    let (feedback_tx, feedback_rx) = mpsc::channel::<Vec<FeedbackItem>>();
    let narrator_handle = {
        let enabled = config.speech.enabled;
        let voice = config.speech.voice();
        let pose = pose_name.clone();
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            let mut narrator = Narrator::new(&pose, voice);
            while let Ok(feedback) = feedback_rx.recv() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if enabled {
                    narrator.observe(&feedback);
                }
            }
            narrator.silence();
        })
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let pump = FramePump::new(
        Arc::clone(&client),
        Arc::clone(&session),
        feedback_tx,
        Arc::clone(&running),
        runtime.handle().clone(),
    );

    let window_w = cam_w as usize;
    let window_h = cam_h as usize;
    let mut window = CoachWindow::new("Asana Coach", window_w, window_h)?;
    let mut canvas = OverlayCanvas::new(window_w, window_h);

    let inset_pos = window_w
        .checked_sub(INSET_WIDTH + INSET_MARGIN)
        .zip(window_h.checked_sub(INSET_HEIGHT + INSET_MARGIN));

    let upload_format = config.camera.snapshot_format();
    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);

    let mut instructor_big = false;
    let mut last_upload_id: u64 = 0;
    let mut frame_count = 0u32;
    let mut fps_timer = Instant::now();

    while window.is_open() {
        if shutdown.load(Ordering::Relaxed) {
            log!(logfile, "[signal] shutdown requested");
            break;
        }
        let loop_start = Instant::now();

        if window.layout_toggle_pressed() && instructor.is_some() {
            instructor_big = !instructor_big;
        }

        let frame = match camera.get_frame() {
            Some(f) => f,
            None => {
                // No frame yet: keep the window responsive while waiting
                window.present(&canvas)?;
                std::thread::sleep(Duration::from_millis(16));
                continue;
            }
        };

        // Upload each new camera frame; the pump coalesces under load
        let current_frame_id = camera.frame_id();
        if !pose_name.is_empty() && current_frame_id != last_upload_id {
            match encode_snapshot(&frame, upload_format, config.camera.quality) {
                Ok(snapshot) => pump.submit(snapshot),
                Err(err) => log!(logfile, "[upload] encode failed: {err:#}"),
            }
            last_upload_id = current_frame_id;
        }

        let mut instructor_failed = false;
        let instructor_frame = match instructor.as_mut() {
            Some(looper) => match looper.next_frame() {
                Ok(f) => Some(f),
                Err(err) => {
                    log!(logfile, "[instructor] playback stopped: {err:#}");
                    instructor_failed = true;
                    None
                }
            },
            None => None,
        };
        if instructor_failed {
            instructor = None;
            instructor_big = false;
        }

        let state = session.lock().unwrap().clone();
        let hud = build_hud(&state);

        // Compose: one frame fills the window, the other rides the inset.
        // Markers always anchor to wherever the webcam view currently is.
        let (big_src, small_src) = if instructor_big {
            match instructor_frame.as_ref() {
                Some(inst) => (inst, Some(&frame)),
                None => (&frame, None),
            }
        } else {
            (&frame, instructor_frame.as_ref())
        };

        let mut big = fit_frame(big_src, window_w as i32, window_h as i32)?;
        let mut y = HUD_TOP;
        for line in &hud.lines {
            let foreground = if hud.praise && line.as_str() == PRAISE_MESSAGE {
                Scalar::new(0.0, 255.0, 0.0, 0.0)
            } else {
                Scalar::new(255.0, 255.0, 255.0, 0.0)
            };
            draw_hud_line(&mut big, line, y, foreground)?;
            y += HUD_LINE_STEP;
        }
        canvas.blit_bgr(&big)?;

        let mut webcam_rect = ViewRect::full(window_w, window_h);
        if let (Some(small), Some((ix, iy))) = (small_src, inset_pos) {
            let small_resized = fit_frame(small, INSET_WIDTH as i32, INSET_HEIGHT as i32)?;
            canvas.blit_bgr_at(&small_resized, ix, iy)?;
            if instructor_big {
                webcam_rect = ViewRect {
                    x: ix as i32,
                    y: iy as i32,
                    width: INSET_WIDTH,
                    height: INSET_HEIGHT,
                };
            }
        }

        draw_markers(&mut canvas, webcam_rect, &state.keypoints, &state.feedback);
        window.present(&canvas)?;

        // Stats once per second
        frame_count += 1;
        let elapsed = fps_timer.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let (completed, failed, coalesced) = pump.stats().snapshot();
            log!(
                logfile,
                "[fps] {:.1} | exchange ok={} err={} coalesced={} in_flight={}",
                frame_count as f64 / elapsed.as_secs_f64(),
                completed,
                failed,
                coalesced,
                pump.in_flight(),
            );
            frame_count = 0;
            fps_timer = Instant::now();
        }

        let spent = loop_start.elapsed();
        if spent < frame_duration {
            std::thread::sleep(frame_duration - spent);
        }
    }

    log!(logfile, "Shutting down...");
    running.store(false, Ordering::SeqCst);
    drop(pump);
    // Dropping the runtime ends in-flight workers, which releases the
    // narrator channel and lets that thread exit.
    runtime.shutdown_timeout(Duration::from_secs(2));
    let _ = narrator_handle.join();
    Ok(())
}
