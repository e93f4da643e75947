use yt_flashcards::{
    JsonResponseParser, PipelineError, assemble, render_card, validate_flashcards,
    validate_topics,
};

#[test]
fn test_noisy_model_output_is_validated_into_decks() {
    let response = r#"Here are your cards:
{"decks": [{"topic": "Algebra", "subtopic": "Lecture 1", "cards": [
  {"type": "single_choice", "question": "2+2?", "options": ["3", "4", "5"], "correct_option": 1, "explanation": "basic", "difficulty": "easy"}
]}]}
Let me know if you need more."#;

    let flashcards = validate_flashcards(JsonResponseParser::recover(response)).unwrap();
    assert_eq!(flashcards.decks[0].deck_path(), "Algebra::Lecture 1");

    let set = assemble(&flashcards, "Algebra");
    assert_eq!(set.decks.len(), 1);
    assert_eq!(set.decks[0].notes[0].back, "Correct: 2");
    assert_eq!(render_card(&flashcards.decks[0].cards[0]).extra, "basic");
}

#[test]
fn test_unknown_card_type_fails_the_batch() {
    let map = JsonResponseParser::recover(
        r#"{"decks": [{"topic": "T", "cards": [
            {"type": "qa", "question": "q", "answer": "a"},
            {"type": "unknown", "question": "q"}
        ]}]}"#,
    );
    assert!(matches!(
        validate_flashcards(map),
        Err(PipelineError::Schema(_))
    ));
}

#[test]
fn test_garbage_recovers_to_empty_outline() {
    let map = JsonResponseParser::recover("the model refused to answer");
    assert!(map.is_empty());
    assert!(validate_topics(map).unwrap().topics.is_empty());

    let map = JsonResponseParser::recover("noise {\"topics\": []} noise");
    assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"topics":[]}"#);
}

#[test]
fn test_missing_required_fields_are_schema_errors() {
    let map = JsonResponseParser::recover(r#"{"decks": [{"cards": []}]}"#);
    assert!(matches!(
        validate_flashcards(map),
        Err(PipelineError::Schema(_))
    ));

    let map = JsonResponseParser::recover(r#"{"topics": [{"subtopics": []}]}"#);
    assert!(matches!(validate_topics(map), Err(PipelineError::Schema(_))));
}

#[test]
fn test_extreme_answer_indices_assemble_under_default_policy() {
    let map = JsonResponseParser::recover(
        r#"{"decks": [{"topic": "T", "cards": [
            {"type": "single_choice", "question": "q", "options": ["a", "b"], "correct_option": 9223372036854775807},
            {"type": "multiple_choice", "question": "q", "options": ["a", "b"], "correct_options": [-1, 9223372036854775807]}
        ]}]}"#,
    );
    let flashcards = validate_flashcards(map).unwrap();

    let set = assemble(&flashcards, "T");
    assert_eq!(set.decks[0].notes[0].back, "Correct: 9223372036854775808");
    assert_eq!(set.decks[0].notes[1].back, "Correct: 0, 9223372036854775808");
}
