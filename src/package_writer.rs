use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::deck_assembler::{AssembledDeck, DeckSet, stable_id};
use crate::errors::{PipelineError, PipelineResult};
use crate::{log_package_operation, log_performance};

const COLLECTION_ENTRY: &str = "collection.anki2";
const MEDIA_ENTRY: &str = "media";
const FIELD_SEPARATOR: &str = "\x1f";
const DEFAULT_DECK_ID: i64 = 1;
const DEFAULT_FILE_STEM: &str = "Generated_Deck";
pub const PACKAGE_EXTENSION: &str = "apkg";

const DEFAULT_CSS: &str = ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n";
const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";
const LATEX_POST: &str = "\\end{document}";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("html tag pattern is valid"));

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE col (
        id              integer primary key,
        crt             integer not null,
        mod             integer not null,
        scm             integer not null,
        ver             integer not null,
        dty             integer not null,
        usn             integer not null,
        ls              integer not null,
        conf            text not null,
        models          text not null,
        decks           text not null,
        dconf           text not null,
        tags            text not null
    );
    "#,
    r#"
    CREATE TABLE notes (
        id              integer primary key,
        guid            text not null,
        mid             integer not null,
        mod             integer not null,
        usn             integer not null,
        tags            text not null,
        flds            text not null,
        sfld            integer not null,
        csum            integer not null,
        flags           integer not null,
        data            text not null
    );
    "#,
    r#"
    CREATE TABLE cards (
        id              integer primary key,
        nid             integer not null,
        did             integer not null,
        ord             integer not null,
        mod             integer not null,
        usn             integer not null,
        type            integer not null,
        queue           integer not null,
        due             integer not null,
        ivl             integer not null,
        factor          integer not null,
        reps            integer not null,
        lapses          integer not null,
        left            integer not null,
        odue            integer not null,
        odid            integer not null,
        flags           integer not null,
        data            text not null
    );
    "#,
    r#"
    CREATE TABLE revlog (
        id              integer primary key,
        cid             integer not null,
        usn             integer not null,
        ease            integer not null,
        ivl             integer not null,
        lastIvl         integer not null,
        factor          integer not null,
        time            integer not null,
        type            integer not null
    );
    "#,
    r#"
    CREATE TABLE graves (
        usn             integer not null,
        oid             integer not null,
        type            integer not null
    );
    "#,
    "CREATE INDEX ix_notes_usn on notes (usn);",
    "CREATE INDEX ix_cards_usn on cards (usn);",
    "CREATE INDEX ix_revlog_usn on revlog (usn);",
    "CREATE INDEX ix_cards_nid on cards (nid);",
    "CREATE INDEX ix_cards_sched on cards (did, queue, due);",
    "CREATE INDEX ix_revlog_cid on revlog (cid);",
    "CREATE INDEX ix_notes_csum on notes (csum);",
];

/// The single note type shared by every generated note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTemplate {
    pub id: u32,
    pub name: String,
    pub fields: Vec<String>,
    pub card_name: String,
    pub front_format: String,
    pub back_format: String,
}

impl NoteTemplate {
    /// Template whose id is scoped to the run's deck name
    pub fn for_deck(deck_name: &str) -> Self {
        Self {
            id: stable_id(&format!("{deck_name}::model")),
            name: "UniversalCardModel".to_string(),
            fields: vec![
                "Question".to_string(),
                "Answer".to_string(),
                "Extra".to_string(),
            ],
            card_name: "Card 1".to_string(),
            front_format: "{{Question}}".to_string(),
            back_format: "{{FrontSide}}<hr id=answer>{{Answer}}<br/><br/>{{Extra}}".to_string(),
        }
    }

    fn to_json(&self, modified: i64) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .enumerate()
            .map(|(ord, name)| {
                json!({
                    "name": name,
                    "ord": ord,
                    "font": "Liberation Sans",
                    "media": [],
                    "rtl": false,
                    "size": 20,
                    "sticky": false
                })
            })
            .collect();

        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "type": 0,
            "mod": modified,
            "usn": -1,
            "sortf": 0,
            "did": DEFAULT_DECK_ID,
            "tmpls": [{
                "name": self.card_name,
                "ord": 0,
                "qfmt": self.front_format,
                "afmt": self.back_format,
                "bqfmt": "",
                "bafmt": "",
                "did": null
            }],
            "flds": fields,
            "css": DEFAULT_CSS,
            "latexPre": LATEX_PRE,
            "latexPost": LATEX_POST,
            "latexsvg": false,
            "req": [[0, "any", [0]]],
            "tags": [],
            "vers": []
        })
    }
}

fn deck_json(id: i64, name: &str, modified: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "collapsed": false,
        "conf": 1,
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "mod": modified,
        "usn": -1,
        "lrnToday": [0, 0],
        "newToday": [0, 0],
        "revToday": [0, 0],
        "timeToday": [0, 0]
    })
}

fn default_deck_config() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "autoplay": true,
            "dyn": false,
            "maxTaken": 60,
            "mod": 0,
            "usn": 0,
            "replayq": true,
            "timer": 0,
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}

fn collection_config(template_id: u32, next_position: usize) -> Value {
    json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "curDeck": DEFAULT_DECK_ID,
        "curModel": template_id.to_string(),
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "nextPos": next_position,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true
    })
}

fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").trim().to_string()
}

fn note_guid(deck: &AssembledDeck, fields: &[&str]) -> String {
    let key = format!("{}{}{}", deck.name, FIELD_SEPARATOR, fields.join(FIELD_SEPARATOR));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// File name for a deck: path separators and spaces become underscores
pub fn package_file_name(deck_name: &str) -> String {
    let stem: String = deck_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' => '_',
            other => other,
        })
        .collect();
    let stem = if stem.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        stem
    };
    format!("{stem}.{PACKAGE_EXTENSION}")
}

/// Decide where the package goes.
///
/// An explicit destination wins; an existing directory gets the derived file
/// name appended. Without one, the file lands in `base_dir`, which must be set.
pub fn resolve_output_path(
    deck_name: &str,
    destination: Option<&Path>,
    base_dir: Option<&Path>,
) -> PipelineResult<PathBuf> {
    if let Some(destination) = destination.filter(|p| !p.as_os_str().is_empty()) {
        if destination.is_dir() {
            return Ok(destination.join(package_file_name(deck_name)));
        }
        return Ok(destination.to_path_buf());
    }

    match base_dir.filter(|p| !p.as_os_str().is_empty()) {
        Some(base) => Ok(base.join(package_file_name(deck_name))),
        None => Err(PipelineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no destination path given and no base directory to derive one from",
        ))),
    }
}

/// Write the deck set as a package archive at `destination`.
///
/// The archive is staged next to the destination and renamed into place, so
/// a failed write leaves nothing behind.
pub async fn write_package(deck_set: &DeckSet, destination: &Path) -> PipelineResult<PathBuf> {
    let started = Instant::now();
    let template = NoteTemplate::for_deck(&deck_set.name);

    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let scratch = tempfile::tempdir()?;
    let collection_path = scratch.path().join(COLLECTION_ENTRY);
    build_collection(&collection_path, deck_set, &template).await?;
    let collection = tokio::fs::read(&collection_path).await?;

    let mut staged = tempfile::Builder::new()
        .prefix(".apkg-")
        .tempfile_in(&parent)?;
    {
        let mut archive = ZipWriter::new(staged.as_file_mut());
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        archive.start_file(COLLECTION_ENTRY, options)?;
        archive.write_all(&collection)?;
        archive.start_file(MEDIA_ENTRY, options)?;
        archive.write_all(b"{}")?;
        archive.finish()?;
    }
    staged.persist(destination).map_err(|e| {
        log_package_operation!(error, "persist", error = e);
        PipelineError::Io(e.error)
    })?;

    log_package_operation!(
        info,
        "write_package",
        path = destination.display(),
        format!(
            "{} decks, {} notes",
            deck_set.decks.len(),
            deck_set.note_count()
        )
    );
    log_performance!(
        "write_package",
        duration_ms = started.elapsed().as_millis() as u64
    );

    Ok(destination.to_path_buf())
}

async fn build_collection(
    path: &Path,
    deck_set: &DeckSet,
    template: &NoteTemplate,
) -> PipelineResult<()> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let result = populate_collection(&pool, deck_set, template).await;
    pool.close().await;
    result
}

async fn populate_collection(
    pool: &SqlitePool,
    deck_set: &DeckSet,
    template: &NoteTemplate,
) -> PipelineResult<()> {
    for &statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let now = Utc::now();
    let now_secs = now.timestamp();
    let now_millis = now.timestamp_millis();

    let mut models = Map::new();
    models.insert(template.id.to_string(), template.to_json(now_secs));

    let mut decks = Map::new();
    decks.insert(
        DEFAULT_DECK_ID.to_string(),
        deck_json(DEFAULT_DECK_ID, "Default", now_secs),
    );
    for deck in &deck_set.decks {
        decks.insert(
            deck.id.to_string(),
            deck_json(i64::from(deck.id), &deck.name, now_secs),
        );
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
        VALUES (1, ?, ?, ?, 11, 0, 0, 0, ?, ?, ?, ?, '{}')
        "#,
    )
    .bind(now_secs)
    .bind(now_millis)
    .bind(now_millis)
    .bind(collection_config(template.id, deck_set.note_count() + 1).to_string())
    .bind(Value::Object(models).to_string())
    .bind(Value::Object(decks).to_string())
    .bind(default_deck_config().to_string())
    .execute(&mut *tx)
    .await?;

    let mut next_id = now_millis;
    let mut position: i64 = 0;

    for deck in &deck_set.decks {
        for note in &deck.notes {
            let fields = note.fields();
            let sort_field = strip_html(&note.front);
            let note_id = next_id;
            let card_id = next_id + 1;
            next_id += 2;
            position += 1;

            sqlx::query(
                r#"
                INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                VALUES (?, ?, ?, ?, -1, '', ?, ?, ?, 0, '')
                "#,
            )
            .bind(note_id)
            .bind(note_guid(deck, &fields))
            .bind(i64::from(template.id))
            .bind(now_secs)
            .bind(fields.join(FIELD_SEPARATOR))
            .bind(&sort_field)
            .bind(i64::from(stable_id(&sort_field)))
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO cards
                VALUES (?, ?, ?, 0, ?, -1, 0, 0, ?, 0, 0, 0, 0, 0, 0, 0, 0, '')
                "#,
            )
            .bind(card_id)
            .bind(note_id)
            .bind(i64::from(deck.id))
            .bind(now_secs)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    log_package_operation!(
        debug,
        "populate_collection",
        deck_count = deck_set.decks.len(),
        note_count = deck_set.note_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_id_is_scoped_to_deck_name() {
        let template = NoteTemplate::for_deck("Algebra");
        assert_eq!(template.id, stable_id("Algebra::model"));
        assert_eq!(template.fields, vec!["Question", "Answer", "Extra"]);
        assert_eq!(NoteTemplate::for_deck("Algebra"), template);
        assert_ne!(NoteTemplate::for_deck("Geometry").id, template.id);
    }

    #[test]
    fn test_template_json_shape() {
        let json = NoteTemplate::for_deck("Algebra").to_json(0);
        assert_eq!(json["flds"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["flds"][2]["name"], "Extra");
        assert_eq!(json["tmpls"][0]["qfmt"], "{{Question}}");
        assert!(
            json["tmpls"][0]["afmt"]
                .as_str()
                .is_some_and(|afmt| afmt.contains("<hr id=answer>{{Answer}}"))
        );
    }

    #[test]
    fn test_package_file_name_sanitizes() {
        assert_eq!(package_file_name("My Video/Part 1"), "My_Video_Part_1.apkg");
        assert_eq!(package_file_name("a\\b"), "a_b.apkg");
        assert_eq!(package_file_name("   "), "Generated_Deck.apkg");
    }

    #[test]
    fn test_explicit_destination_wins() {
        let path = resolve_output_path(
            "Deck",
            Some(Path::new("/tmp/out/custom.apkg")),
            Some(Path::new("/elsewhere")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/out/custom.apkg"));
    }

    #[test]
    fn test_destination_directory_gets_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve_output_path("My Deck", Some(dir.path()), None).unwrap();
        assert_eq!(path, dir.path().join("My_Deck.apkg"));
    }

    #[test]
    fn test_derived_from_base_dir() {
        let path = resolve_output_path("My Deck", None, Some(Path::new("/data"))).unwrap();
        assert_eq!(path, PathBuf::from("/data/My_Deck.apkg"));

        let path =
            resolve_output_path("My Deck", Some(Path::new("")), Some(Path::new("/data"))).unwrap();
        assert_eq!(path, PathBuf::from("/data/My_Deck.apkg"));
    }

    #[test]
    fn test_missing_base_dir_is_an_error() {
        let error = resolve_output_path("Deck", None, None).unwrap_err();
        match error {
            PipelineError::Io(io_error) => {
                assert_eq!(io_error.kind(), io::ErrorKind::InvalidInput)
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(resolve_output_path("Deck", None, Some(Path::new(""))).is_err());
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("Pick<br/><br/>1. a"), "Pick1. a");
        assert_eq!(strip_html("  <b>bold</b> "), "bold");
    }
}
