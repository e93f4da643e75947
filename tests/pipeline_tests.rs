use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use yt_flashcards::config::LLMConfig;
use yt_flashcards::{
    CompletionProvider, LLMProviderType, LLMService, PackageTarget, Pipeline, PipelineError,
    PipelineResult, TitleLookup, TranscriptSource,
};

type EventLog = Arc<Mutex<Vec<String>>>;

const TOPICS_RESPONSE: &str =
    r#"{"topics": [{"title": "Photosynthesis", "subtopics": [{"title": "Light reactions"}]}]}"#;

const FLASHCARDS_RESPONSE: &str = r#"Sure! ```json
{
  "decks": [
    {
      "topic": "Photosynthesis",
      "subtopic": "Light reactions",
      "cards": [
        {"type": "qa", "question": "Where do light reactions happen?", "answer": "Thylakoid membrane"},
        {"type": "multiple_choice", "question": "Products", "options": ["ATP", "NADPH", "CO2"], "correct_options": [0, 1]}
      ]
    }
  ]
}
```"#;

struct FakeTranscripts {
    events: EventLog,
    result: Result<String, String>,
}

#[async_trait]
impl TranscriptSource for FakeTranscripts {
    async fn fetch(&self, video_url: &str, languages: &[String]) -> PipelineResult<String> {
        self.events
            .lock()
            .unwrap()
            .push(format!("transcript:{}:{}", video_url, languages.join(",")));
        self.result
            .clone()
            .map_err(PipelineError::TranscriptUnavailable)
    }
}

struct FakeTitles {
    events: EventLog,
    title: Option<String>,
}

#[async_trait]
impl TitleLookup for FakeTitles {
    async fn fetch_title(&self, _video_url: &str) -> Option<String> {
        self.events.lock().unwrap().push("title".to_string());
        self.title.clone()
    }
}

struct FakeProvider {
    events: EventLog,
    prompts: Mutex<Vec<String>>,
    responses: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    async fn complete(
        &self,
        prompt: &str,
        _max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> anyhow::Result<String> {
        assert!(response_schema.is_some());
        self.events.lock().unwrap().push("complete".to_string());
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            anyhow::bail!("no scripted response left");
        }
        Ok(responses.remove(0))
    }

    async fn list_models(&self) -> Vec<String> {
        Vec::new()
    }

    fn provider_name(&self) -> &'static str {
        "Fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

struct Harness {
    events: EventLog,
    provider: Arc<FakeProvider>,
    pipeline: Pipeline,
}

fn harness(transcript: Result<String, String>, title: Option<&str>) -> Harness {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(FakeProvider {
        events: events.clone(),
        prompts: Mutex::new(Vec::new()),
        responses: Mutex::new(vec![
            TOPICS_RESPONSE.to_string(),
            FLASHCARDS_RESPONSE.to_string(),
        ]),
    });

    let config = LLMConfig::for_provider(LLMProviderType::Groq, "test-key".to_string());
    let llm = LLMService::new(provider.clone(), &config);
    let pipeline = Pipeline::new(
        Arc::new(FakeTranscripts {
            events: events.clone(),
            result: transcript,
        }),
        Arc::new(FakeTitles {
            events: events.clone(),
            title: title.map(str::to_string),
        }),
        llm,
        vec!["en".to_string(), "en-US".to_string()],
    );

    Harness {
        events,
        provider,
        pipeline,
    }
}

#[tokio::test]
async fn test_run_generates_package_from_video() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(
        Ok("Light reactions happen in the thylakoid".to_string()),
        Some("Biology 101"),
    );

    let target = PackageTarget {
        base_dir: Some(dir.path().to_path_buf()),
        ..PackageTarget::default()
    };
    let path = harness
        .pipeline
        .run("https://youtu.be/dQw4w9WgXcQ", &target)
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("Biology_101.apkg"));
    assert!(path.exists());

    let events = harness.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "transcript:https://youtu.be/dQw4w9WgXcQ:en,en-US",
            "complete",
            "complete",
            "title",
        ]
    );

    let prompts = harness.provider.prompts.lock().unwrap().clone();
    assert!(prompts[0].ends_with("Transcript:\nLight reactions happen in the thylakoid"));
    assert!(prompts[1].contains("Topics JSON:\n{\"topics\":[{\"title\":\"Photosynthesis\""));
    assert!(prompts[1].contains("\"Light reactions\""));
}

#[tokio::test]
async fn test_explicit_deck_name_skips_title_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(Ok("transcript".to_string()), Some("Ignored"));
    let destination = dir.path().join("custom.apkg");

    let target = PackageTarget {
        destination: Some(destination.clone()),
        base_dir: None,
        deck_name: Some("Botany".to_string()),
    };
    let path = harness.pipeline.run("dQw4w9WgXcQ", &target).await.unwrap();

    assert_eq!(path, destination);
    assert!(!harness.events.lock().unwrap().contains(&"title".to_string()));
}

#[tokio::test]
async fn test_missing_title_falls_back_to_default_name() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(Ok("transcript".to_string()), None);

    let target = PackageTarget {
        base_dir: Some(dir.path().to_path_buf()),
        ..PackageTarget::default()
    };
    let path = harness.pipeline.run("dQw4w9WgXcQ", &target).await.unwrap();
    assert_eq!(path, dir.path().join("Generated_Deck.apkg"));
}

#[tokio::test]
async fn test_unavailable_transcript_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(Err("No transcript found or generated.".to_string()), None);

    let target = PackageTarget {
        base_dir: Some(dir.path().to_path_buf()),
        ..PackageTarget::default()
    };
    let result = harness.pipeline.run("dQw4w9WgXcQ", &target).await;

    assert!(matches!(result, Err(PipelineError::TranscriptUnavailable(_))));
    assert!(harness.provider.prompts.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
