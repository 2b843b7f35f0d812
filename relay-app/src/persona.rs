//! Persona system prompt, read from disk on every generation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Used when the persona file does not exist.
pub const MISSING_FILE_PERSONA: &str = "あなたは昭和生まれの温かいおばあちゃん「ろんな」です。
関西弁混じりの優しい口調で、人生経験を活かしたアドバイスをしてください。
80-120文字程度で簡潔に応答してください。";

/// Used for any other read failure.
pub const READ_ERROR_PERSONA: &str = "あなたは優しいおばあちゃんろんなです。温かく応答してください。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaOrigin {
    File,
    MissingFileFallback,
    ReadErrorFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub text: String,
    pub origin: PersonaOrigin,
}

#[derive(Debug, Clone)]
pub struct PersonaSource {
    path: PathBuf,
}

impl PersonaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: read errors resolve to one of the built-in personas.
    pub async fn load(&self) -> Persona {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let text = contents.trim();
                if text.is_empty() {
                    tracing::warn!(path = %self.path.display(), "persona file is blank");
                }
                Persona {
                    text: text.to_string(),
                    origin: PersonaOrigin::File,
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(path = %self.path.display(), "persona file not found, using fallback prompt");
                Persona {
                    text: MISSING_FILE_PERSONA.to_string(),
                    origin: PersonaOrigin::MissingFileFallback,
                }
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "error loading persona file");
                Persona {
                    text: READ_ERROR_PERSONA.to_string(),
                    origin: PersonaOrigin::ReadErrorFallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_contents_are_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_prompt.txt");
        tokio::fs::write(&path, "\n  あなたは元気なおばあちゃんです。 \n")
            .await
            .expect("write persona");

        let persona = PersonaSource::new(&path).load().await;
        assert_eq!(persona.origin, PersonaOrigin::File);
        assert_eq!(persona.text, "あなたは元気なおばあちゃんです。");
    }

    #[tokio::test]
    async fn blank_file_is_sent_as_is() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_prompt.txt");
        tokio::fs::write(&path, " \n\t\n").await.expect("write persona");

        let persona = PersonaSource::new(&path).load().await;
        assert_eq!(persona.origin, PersonaOrigin::File);
        assert_eq!(persona.text, "");
    }

    #[tokio::test]
    async fn missing_file_uses_full_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persona = PersonaSource::new(dir.path().join("absent.txt")).load().await;
        assert_eq!(persona.origin, PersonaOrigin::MissingFileFallback);
        assert_eq!(persona.text, MISSING_FILE_PERSONA);
    }

    #[tokio::test]
    async fn unreadable_path_uses_generic_fallback() {
        // Reading a directory as a file fails with something other than NotFound.
        let dir = tempfile::tempdir().expect("tempdir");
        let persona = PersonaSource::new(dir.path()).load().await;
        assert_eq!(persona.origin, PersonaOrigin::ReadErrorFallback);
        assert_eq!(persona.text, READ_ERROR_PERSONA);
    }

    #[tokio::test]
    async fn file_is_reread_on_every_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_prompt.txt");
        let source = PersonaSource::new(&path);

        tokio::fs::write(&path, "first").await.expect("write persona");
        assert_eq!(source.load().await.text, "first");
        tokio::fs::write(&path, "second").await.expect("write persona");
        assert_eq!(source.load().await.text, "second");
    }
}
