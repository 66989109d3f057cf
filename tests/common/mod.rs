//! Shared fixture: a small building-code corpus in a temporary SQLite file.
//!
//! | id | kind    | number      | title         | parent | chapter | page |
//! |----|---------|-------------|---------------|--------|---------|------|
//! | 1  | section | 101         | Scope         |        | 1       | 11   |
//! | 2  | section | 101.1       | Title         | 1      | 1       | 12   |
//! | 3  | section | 102         | Applicability |        | 1       | 13   |
//! | 4  | table   | Table 101.2 | Occupant load | 1      | 1       |      |
//! | 5  | section | 201         | Definitions   |        | 2       | 21   |
//!
//! References: 1→3 "Section 102", 1→∅ "NFPA 13", 3→1 "Section 101".

#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use code_harness::config::{parse_config, Config};
use code_harness_core::embedding::{fallback_embedding, vec_to_blob};

pub const DIMS: usize = 64;
pub const SCHEMA: &str = include_str!("../fixtures/schema.sql");

pub const SCOPE_TEXT: &str =
    "These provisions govern the construction of buildings. Sprinkler systems shall comply with NFPA 13.";
pub const TITLE_TEXT: &str = "These regulations shall be known as the Building Code.";
pub const APPLICABILITY_TEXT: &str =
    "Where a general requirement conflicts with a specific requirement, the specific requirement shall apply.";
pub const TABLE_TEXT: &str = "Occupant load factors per occupancy classification.";
pub const DEFINITIONS_TEXT: &str = "Words defined in this chapter have the meanings shown.";

struct Row {
    id: i64,
    kind: &'static str,
    number: &'static str,
    title: &'static str,
    text: &'static str,
    parent: Option<i64>,
    chapter: i64,
    depth: i64,
    position: i64,
    page: Option<&'static str>,
}

fn rows() -> Vec<Row> {
    vec![
        Row {
            id: 1,
            kind: "section",
            number: "101",
            title: "Scope",
            text: SCOPE_TEXT,
            parent: None,
            chapter: 1,
            depth: 0,
            position: 0,
            page: Some("11"),
        },
        Row {
            id: 2,
            kind: "section",
            number: "101.1",
            title: "Title",
            text: TITLE_TEXT,
            parent: Some(1),
            chapter: 1,
            depth: 1,
            position: 0,
            page: Some("12"),
        },
        Row {
            id: 3,
            kind: "section",
            number: "102",
            title: "Applicability",
            text: APPLICABILITY_TEXT,
            parent: None,
            chapter: 1,
            depth: 0,
            position: 1,
            page: Some("13"),
        },
        Row {
            id: 4,
            kind: "table",
            number: "Table 101.2",
            title: "Occupant load",
            text: TABLE_TEXT,
            parent: Some(1),
            chapter: 1,
            depth: 1,
            position: 1,
            page: None,
        },
        Row {
            id: 5,
            kind: "section",
            number: "201",
            title: "Definitions",
            text: DEFINITIONS_TEXT,
            parent: None,
            chapter: 2,
            depth: 0,
            position: 0,
            page: Some("21"),
        },
    ]
}

/// Writable pool over `db_path` with the corpus schema applied.
pub async fn schema_pool(db_path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
    pool
}

/// Create the schema and insert the fixture corpus at `db_path`.
pub async fn seed_corpus(db_path: &Path) {
    let pool = schema_pool(db_path).await;

    for row in rows() {
        sqlx::query(
            "INSERT INTO corpus_items \
             (id, kind, title, text, number, chapter_id, parent_id, depth, position, page, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.kind)
        .bind(row.title)
        .bind(row.text)
        .bind(row.number)
        .bind(row.chapter)
        .bind(row.parent)
        .bind(row.depth)
        .bind(row.position)
        .bind(row.page)
        .bind(vec_to_blob(&fallback_embedding(row.text, DIMS)))
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO corpus_fts (item_id, number, title, text) VALUES (?, ?, ?, ?)")
            .bind(row.id)
            .bind(row.number)
            .bind(row.title)
            .bind(row.text)
            .execute(&pool)
            .await
            .unwrap();
    }

    let references: [(i64, Option<i64>, &str, &str); 3] = [
        (1, Some(3), "section", "Section 102"),
        (1, None, "external", "NFPA 13"),
        (3, Some(1), "section", "Section 101"),
    ];
    for (source, target, ty, text) in references {
        sqlx::query(
            "INSERT INTO section_references \
             (source_id, target_id, reference_type, reference_text, span_start, span_end) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(source)
        .bind(target)
        .bind(ty)
        .bind(text)
        .bind(text.len() as i64)
        .execute(&pool)
        .await
        .unwrap();
    }

    pool.close().await;
}

pub fn config_toml(db_path: &Path) -> String {
    format!(
        r#"[db]
path = "{}"

[retrieval]
rrf_k = 60
max_hits = 5

[embedding]
provider = "disabled"
dims = {}
allow_fallback = true

[citations]
url_template = "https://codes.example/page/{{page}}"
"#,
        db_path.display(),
        DIMS
    )
}

pub fn test_config(db_path: &Path) -> Config {
    parse_config(&config_toml(db_path)).unwrap()
}

/// Temp dir holding `data/corpus.sqlite` and `config/chx.toml`.
pub async fn setup_corpus() -> (TempDir, PathBuf, Config) {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&data_dir).unwrap();
    fs::create_dir_all(&config_dir).unwrap();

    let db_path = data_dir.join("corpus.sqlite");
    seed_corpus(&db_path).await;

    let config_path = config_dir.join("chx.toml");
    fs::write(&config_path, config_toml(&db_path)).unwrap();

    let config = test_config(&db_path);
    (tmp, config_path, config)
}
