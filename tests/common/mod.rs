#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use archive_qa::config::{self, Config};
use archive_qa::{db, migrate};
use sqlx::SqlitePool;

/// Write a config file under `root` and return its path.
///
/// The provider endpoint points at a closed local port so an unexpected
/// model call fails fast instead of leaving the machine.
pub fn write_config(root: &Path, api_key_env: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let content = format!(
        r#"[db]
path = "{}/data/archive.sqlite"

[retrieval]
chunk_limit = 6
min_question_length = 3
snippet_chars = 800

[llm]
endpoint = "http://127.0.0.1:9/v1/responses"
api_key_env = "{}"
primary_model = "primary-model"
fallback_model = "fallback-model"
max_attempts = 2
timeout_secs = 2
web_search = true

[session]
history_limit = 12
ip_salt = "test-salt"

[server]
bind = "127.0.0.1:7399"
"#,
        root.display(),
        api_key_env
    );

    let path = config_dir.join("aqa.toml");
    fs::write(&path, content).unwrap();
    path
}

pub fn load(config_path: &Path) -> Config {
    config::load_config(config_path).unwrap()
}

/// Create the schema and load a small archive:
///
/// | id | title | notes |
/// |----|-------|-------|
/// | 1 | Flight log volume 1 | three flights, two with both Epstein and Maxwell in 1999 |
/// | 2 | Non-prosecution agreement | Florida plea summary |
/// | 3 | MCC incident report | page 2 carries the date of death |
/// | 4 | Palm Beach police report | page 5 carries the masseuse contact list |
pub async fn seed(config: &Config) -> SqlitePool {
    let pool = db::connect(config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();

    let documents: [(i64, &str, Option<&str>, Option<&str>, i64); 4] = [
        (
            1,
            "Flight log volume 1",
            Some("Pilot flight logs"),
            Some("Handwritten pilot logs listing passengers on flights between Teterboro and Palm Beach."),
            100,
        ),
        (
            2,
            "Non-prosecution agreement",
            None,
            Some("The 2007 Florida plea agreement resolving the state investigation."),
            200,
        ),
        (
            3,
            "MCC incident report",
            Some("Bureau of Prisons incident report"),
            None,
            300,
        ),
        (
            4,
            "Palm Beach police report",
            Some("Police investigation into massage appointments"),
            None,
            400,
        ),
    ];
    for (id, title, description, summary, created_at) in documents {
        sqlx::query(
            "INSERT INTO documents (id, title, description, ai_summary, data_set, file_type, created_at)
             VALUES (?, ?, ?, ?, 'DOJ-1', 'pdf', ?)",
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(summary)
        .bind(created_at)
        .execute(&pool)
        .await
        .unwrap();
    }

    let pages: [(i64, i64, &str); 3] = [
        (1, 1, "Pilot log entries for N908JE with passenger initials and airport codes."),
        (
            3,
            2,
            "The inmate was found unresponsive and was pronounced dead on August 10, 2019 at 7:36 a.m.",
        ),
        (4, 5, "Masseuse contact list recovered from the residence, with phone numbers."),
    ];
    for (document_id, page_number, text) in pages {
        sqlx::query("INSERT INTO document_pages (document_id, page_number, ocr_text) VALUES (?, ?, ?)")
            .bind(document_id)
            .bind(page_number)
            .bind(text)
            .execute(&pool)
            .await
            .unwrap();
    }

    let flights: [(i64, &str, &str, &str, Option<&str>, &[&str]); 3] = [
        (
            1,
            "1999-03-01",
            "TEB",
            "PBI",
            Some("Boeing 727"),
            &["Jeffrey Epstein", "Ghislaine Maxwell", "Sarah Kellen"],
        ),
        (
            2,
            "1999-07-04",
            "PBI",
            "TEB",
            None,
            &["Jeffrey Epstein", "Ghislaine Maxwell"],
        ),
        (3, "2001-01-10", "TEB", "STT", Some("Gulfstream"), &["Jeffrey Epstein"]),
    ];
    for (id, date, origin, destination, aircraft, passengers) in flights {
        sqlx::query(
            "INSERT INTO flights (id, document_id, flight_date, origin, destination, aircraft)
             VALUES (?, 1, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(date)
        .bind(origin)
        .bind(destination)
        .bind(aircraft)
        .execute(&pool)
        .await
        .unwrap();
        for name in passengers {
            sqlx::query("INSERT INTO flight_passengers (flight_id, name) VALUES (?, ?)")
                .bind(id)
                .bind(*name)
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    pool
}
