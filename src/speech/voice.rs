use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};

/// 音声合成バックエンド
pub trait Speak: Send {
    /// 読み上げを開始する。再生終了は待たない
    fn speak(&mut self, text: &str) -> Result<()>;
    /// 再生中の発話を打ち切る
    fn cancel(&mut self);
}

/// OS の音声合成コマンドを発話ごとに起動するバックエンド
///
/// cancel は再生中の子プロセスを kill するだけ。速さ・高さは各
/// コマンドの標準値 (通常話速・通常ピッチ) に任せる。
pub struct ProcessVoice {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessVoice {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            child: None,
        }
    }

    /// プラットフォーム標準の合成コマンド
    pub fn default_program() -> &'static str {
        if cfg!(target_os = "macos") {
            "say"
        } else {
            "espeak-ng"
        }
    }

    /// en-US の声を選ぶ標準引数
    pub fn default_args() -> Vec<String> {
        if cfg!(target_os = "macos") {
            Vec::new()
        } else {
            vec!["-v".to_string(), "en-us".to_string()]
        }
    }
}

impl Speak for ProcessVoice {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.cancel();
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("speech command '{}' failed to start", self.program))?;
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                // Finished on its own; nothing to kill
                Ok(Some(_)) => {}
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }
    }
}

impl Drop for ProcessVoice {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_without_speaking_is_harmless() {
        let mut voice = ProcessVoice::new("definitely-not-a-real-command", &[]);
        voice.cancel();
        voice.cancel();
    }

    #[test]
    fn test_missing_program_reports_error() {
        let mut voice = ProcessVoice::new("definitely-not-a-real-command", &[]);
        let err = voice.speak("hello").unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-command"));
    }

    #[test]
    fn test_default_program_is_nonempty() {
        assert!(!ProcessVoice::default_program().is_empty());
    }
}
