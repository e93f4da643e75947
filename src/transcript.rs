use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscriptConfig;
use crate::errors::{PipelineError, PipelineResult};

const LIST_SUBS_HINT_LIMIT: usize = 1500;
const NO_TRANSCRIPT_MESSAGE: &str = "No transcript found or generated.";

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"youtu\.be/([\w-]{11})", r"v=([\w-]{11})", r"([\w-]{11})"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("video id pattern is valid"))
        .collect()
});

/// Source of plain-text transcripts for a video
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, video_url: &str, languages: &[String]) -> PipelineResult<String>;
}

/// Looks up a video's title; `None` when it cannot be determined
#[async_trait]
pub trait TitleLookup: Send + Sync {
    async fn fetch_title(&self, video_url: &str) -> Option<String>;
}

/// Best-effort 11-character video id from a URL or bare id
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|captures| captures[1].to_string())
}

/// Expand `en` to its regional variants and drop duplicates, keeping order.
pub fn normalize_languages(languages: &[String]) -> Vec<String> {
    if languages.is_empty() {
        return vec!["en".to_string()];
    }

    let mut normalized: Vec<String> = Vec::new();
    let expanded = languages.iter().flat_map(|lang| {
        if lang == "en" {
            vec!["en".to_string(), "en.*".to_string()]
        } else {
            vec![lang.clone()]
        }
    });
    for lang in expanded {
        if !normalized.contains(&lang) {
            normalized.push(lang);
        }
    }
    normalized
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
}

/// Pick the subtitle file that best matches the language preference.
///
/// Exact `.{lang}.json3` matches win over regional prefix matches; with
/// neither, the first file is used.
pub fn select_subtitle_file<'a>(files: &'a [PathBuf], languages: &[String]) -> Option<&'a PathBuf> {
    let exact = languages.iter().find_map(|lang| {
        let suffix = format!(".{lang}.json3");
        files.iter().find(|path| file_name(path).contains(&suffix))
    });

    let prefixed = || {
        languages.iter().find_map(|lang| {
            let base = lang.split('-').next().unwrap_or(lang);
            let prefix = format!(".{base}-");
            files.iter().find(|path| file_name(path).contains(&prefix))
        })
    };

    exact.or_else(prefixed).or_else(|| files.first())
}

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Option<Vec<Json3Segment>>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: Option<String>,
}

/// Concatenate the text segments of a json3 subtitle document
pub fn parse_json3(content: &str) -> PipelineResult<String> {
    let document: Json3Document = serde_json::from_str(content).map_err(|e| {
        PipelineError::TranscriptUnavailable(format!("Could not parse subtitle file: {}", e))
    })?;

    let text: String = document
        .events
        .into_iter()
        .flat_map(|event| event.segs.unwrap_or_default())
        .filter_map(|segment| segment.utf8)
        .collect();
    Ok(text.trim().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubtitleMode {
    Manual,
    Automatic,
    Everything,
}

/// yt-dlp backed transcript source and title lookup
#[derive(Debug, Clone)]
pub struct YtDlp {
    config: TranscriptConfig,
}

impl YtDlp {
    pub fn new(config: TranscriptConfig) -> Self {
        Self { config }
    }

    fn network_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(proxy) = &self.config.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }
        if let Some(browser) = &self.config.cookies_browser {
            args.extend(["--cookies-from-browser".to_string(), browser.clone()]);
        }
        if let Some(file) = &self.config.cookies_file {
            args.extend(["--cookies".to_string(), file.clone()]);
        }
        args
    }

    fn subtitle_args(
        &self,
        mode: SubtitleMode,
        languages: &[String],
        work_dir: &Path,
        video_url: &str,
    ) -> Vec<String> {
        let mut args: Vec<String> = match mode {
            SubtitleMode::Manual => vec!["--write-sub".to_string()],
            SubtitleMode::Automatic => vec!["--write-auto-sub".to_string()],
            SubtitleMode::Everything => {
                vec!["--write-sub".to_string(), "--write-auto-sub".to_string()]
            }
        };

        let sub_langs = match mode {
            SubtitleMode::Everything => "all".to_string(),
            _ => normalize_languages(languages).join(","),
        };

        args.extend(
            [
                "--skip-download",
                "--no-progress",
                "--sub-format",
                "json3",
                "--sub-langs",
            ]
            .map(String::from),
        );
        args.push(sub_langs);
        args.push("-o".to_string());
        args.push(work_dir.join("%(id)s").to_string_lossy().into_owned());
        args.extend(self.network_args());
        args.push(video_url.to_string());
        args
    }

    /// Run yt-dlp, returning stdout/stderr; a failed spawn yields `None`
    async fn run(&self, args: &[String]) -> Option<std::process::Output> {
        debug!(binary = %self.config.ytdlp_binary, ?args, "Running yt-dlp");
        match Command::new(&self.config.ytdlp_binary).args(args).output().await {
            Ok(output) => {
                if !output.status.success() {
                    debug!(
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "yt-dlp exited with failure"
                    );
                }
                Some(output)
            }
            Err(e) => {
                warn!(binary = %self.config.ytdlp_binary, error = %e, "Could not start yt-dlp");
                None
            }
        }
    }

    async fn download_subtitles(
        &self,
        mode: SubtitleMode,
        languages: &[String],
        work_dir: &Path,
        video_url: &str,
    ) -> PipelineResult<Vec<PathBuf>> {
        self.run(&self.subtitle_args(mode, languages, work_dir, video_url))
            .await;
        subtitle_files(work_dir)
    }

    async fn list_subs_hint(&self, video_url: &str) -> String {
        let mut args = vec!["--list-subs".to_string()];
        args.extend(self.network_args());
        args.push(video_url.to_string());

        let Some(output) = self.run(&args).await else {
            return String::new();
        };
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let text = if stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        } else {
            stdout
        };
        text.chars().take(LIST_SUBS_HINT_LIMIT).collect()
    }
}

fn subtitle_files(work_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(work_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json3"))
        .collect();
    files.sort();
    Ok(files)
}

#[async_trait]
impl TranscriptSource for YtDlp {
    async fn fetch(&self, video_url: &str, languages: &[String]) -> PipelineResult<String> {
        let work_dir = tempfile::Builder::new()
            .prefix("yt_transcript_")
            .tempdir()?;

        let mut files = Vec::new();
        for mode in [
            SubtitleMode::Manual,
            SubtitleMode::Automatic,
            SubtitleMode::Everything,
        ] {
            files = self
                .download_subtitles(mode, languages, work_dir.path(), video_url)
                .await?;
            if !files.is_empty() {
                debug!(?mode, file_count = files.len(), "Subtitles downloaded");
                break;
            }
        }

        let Some(selected) = select_subtitle_file(&files, languages) else {
            let hint = self.list_subs_hint(video_url).await;
            let mut message = NO_TRANSCRIPT_MESSAGE.to_string();
            if !hint.is_empty() {
                message.push_str(" Available subtitles info (yt-dlp --list-subs):\n");
                message.push_str(&hint);
            }
            return Err(PipelineError::TranscriptUnavailable(message));
        };

        info!(file = %file_name(selected), "Parsing subtitle file");
        let content = tokio::fs::read_to_string(selected).await?;
        let transcript = parse_json3(&content)?;
        if transcript.is_empty() {
            return Err(PipelineError::TranscriptUnavailable(
                "Transcript is empty.".to_string(),
            ));
        }
        Ok(transcript)
    }
}

#[async_trait]
impl TitleLookup for YtDlp {
    async fn fetch_title(&self, video_url: &str) -> Option<String> {
        let mut args = vec!["--skip-download".to_string(), "--dump-single-json".to_string()];
        args.extend(self.network_args());
        args.push(video_url.to_string());

        let output = self.run(&args).await?;
        if !output.status.success() {
            return None;
        }
        let metadata: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        metadata
            .get("title")
            .and_then(|title| title.as_str())
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn paths(values: &[&str]) -> Vec<PathBuf> {
        values.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_extract_video_id() {
        let test_cases = vec![
            ("https://youtu.be/dQw4w9WgXcQ?t=42", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=x", Some("dQw4w9WgXcQ")),
            ("dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("short", None),
        ];
        for (url, expected) in test_cases {
            assert_eq!(extract_video_id(url).as_deref(), expected, "url '{}'", url);
        }
    }

    #[test]
    fn test_normalize_languages() {
        assert_eq!(normalize_languages(&[]), vec!["en"]);
        assert_eq!(
            normalize_languages(&strings(&["en", "en-US", "en", "de"])),
            vec!["en", "en.*", "en-US", "de"]
        );
    }

    #[test]
    fn test_select_subtitle_file() {
        let files = paths(&["/t/abc.de.json3", "/t/abc.en-US.json3", "/t/abc.en.json3"]);
        let preference = strings(&["en", "en-US"]);
        assert_eq!(
            select_subtitle_file(&files, &preference),
            Some(&PathBuf::from("/t/abc.en.json3"))
        );

        let regional = paths(&["/t/abc.de.json3", "/t/abc.en-GB.json3"]);
        assert_eq!(
            select_subtitle_file(&regional, &preference),
            Some(&PathBuf::from("/t/abc.en-GB.json3"))
        );

        let other = paths(&["/t/abc.fr.json3"]);
        assert_eq!(
            select_subtitle_file(&other, &preference),
            Some(&PathBuf::from("/t/abc.fr.json3"))
        );
        assert_eq!(select_subtitle_file(&[], &preference), None);
    }

    #[test]
    fn test_parse_json3() {
        let content = r#"{"events": [
            {"tStartMs": 0, "segs": [{"utf8": " Hello"}, {"utf8": " world"}]},
            {"tStartMs": 10},
            {"segs": [{"utf8": "\n"}, {"acAsrConf": 0}, {"utf8": "again "}]}
        ]}"#;
        assert_eq!(parse_json3(content).unwrap(), "Hello world\nagain");
        assert_eq!(parse_json3(r#"{"events": []}"#).unwrap(), "");
        assert!(matches!(
            parse_json3("not json"),
            Err(PipelineError::TranscriptUnavailable(_))
        ));
    }

    #[test]
    fn test_subtitle_args() {
        let mut config = TranscriptConfig::default();
        config.proxy = Some("socks5://127.0.0.1:1080".to_string());
        let ytdlp = YtDlp::new(config);
        let dir = Path::new("/tmp/work");

        let manual = ytdlp.subtitle_args(SubtitleMode::Manual, &strings(&["en"]), dir, "URL");
        assert_eq!(manual[0], "--write-sub");
        assert!(manual.windows(2).any(|w| w == ["--sub-langs", "en,en.*"]));
        assert!(manual.windows(2).any(|w| w == ["--proxy", "socks5://127.0.0.1:1080"]));
        assert_eq!(manual.last().map(String::as_str), Some("URL"));

        let everything = ytdlp.subtitle_args(SubtitleMode::Everything, &[], dir, "URL");
        assert_eq!(&everything[..2], ["--write-sub", "--write-auto-sub"]);
        assert!(everything.windows(2).any(|w| w == ["--sub-langs", "all"]));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_unavailable_transcript() {
        let mut config = TranscriptConfig::default();
        config.ytdlp_binary = "yt-flashcards-missing-downloader".to_string();
        let ytdlp = YtDlp::new(config);

        let result = ytdlp.fetch("https://youtu.be/dQw4w9WgXcQ", &strings(&["en"])).await;
        match result {
            Err(PipelineError::TranscriptUnavailable(message)) => {
                assert_eq!(message, NO_TRANSCRIPT_MESSAGE)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(ytdlp.fetch_title("https://youtu.be/dQw4w9WgXcQ").await, None);
    }
}
