use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ARCHIVE: &str = r#"{
    "account": {
        "account_id": "42",
        "username": "ada",
        "created_via": "web",
        "created_at": "2020-01-01T00:00:00Z",
        "account_display_name": "Ada"
    },
    "tweets": [
        {
            "tweet_id": "100",
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "full_text": "hello @bob",
            "retweet_count": 1,
            "favorite_count": "2",
            "entities": {
                "user_mentions": [{"id_str": "7", "name": "Bob", "screen_name": "bob"}]
            }
        }
    ],
    "likes": [{"tweet_id": "200", "full_text": "liked"}]
}"#;

/// Command isolated from the caller's env, home directory and dotenv files.
fn carchive(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("carchive").unwrap();
    for var in [
        "CARCHIVE_API_URL",
        "CARCHIVE_SERVICE_KEY",
        "CARCHIVE_TIMEOUT_SECS",
        "CARCHIVE_RETRIES",
        "CARCHIVE_ENV_FILE",
        "CARCHIVE_MODE",
        "CARCHIVE_LOG",
        "SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
        "NODE_ENV",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home).current_dir(home);
    cmd
}

fn write_archive(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("archive.json");
    fs::write(&path, ARCHIVE).unwrap();
    path
}

#[test]
fn upload_without_path_exits_with_usage_hint() {
    let dir = TempDir::new().unwrap();
    carchive(dir.path())
        .arg("upload")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("archive path required"));
}

#[test]
fn upload_of_missing_file_is_malformed_input() {
    let dir = TempDir::new().unwrap();
    carchive(dir.path())
        .args(["upload", "does-not-exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("malformed archive"))
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn upload_of_invalid_json_is_malformed_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    carchive(dir.path())
        .arg("upload")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("malformed archive"));
}

#[test]
fn upload_without_credentials_names_missing_variable() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir);
    carchive(dir.path())
        .arg("upload")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CARCHIVE_API_URL is not set"));
}

#[test]
fn upload_reads_service_key_alias() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir);
    carchive(dir.path())
        .env("SUPABASE_URL", "https://backend.example")
        .arg("upload")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CARCHIVE_SERVICE_KEY is not set"));
}

#[test]
fn dry_run_prints_progress_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir);
    carchive(dir.path())
        .args(["upload", "--dry-run", "--progress", "lines"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploading archive:"))
        .stdout(predicate::str::contains("Inserting tweets:"))
        .stdout(predicate::str::contains("Done: 100%"));
}

#[test]
fn dry_run_json_reports_counts() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir);
    carchive(dir.path())
        .args(["upload", "--dry-run", "--json"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""account_id":"42""#))
        .stdout(predicate::str::contains(r#""tweets":1"#))
        .stdout(predicate::str::contains(r#""likes":1"#))
        .stdout(predicate::str::contains(r#""user_mentions":1"#));
}

#[test]
fn status_hides_service_key() {
    let dir = TempDir::new().unwrap();
    carchive(dir.path())
        .env("CARCHIVE_API_URL", "https://backend.example")
        .env("CARCHIVE_SERVICE_KEY", "very-secret-key")
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://backend.example"))
        .stdout(predicate::str::contains("(set)"))
        .stdout(predicate::str::contains("very-secret-key").not());
}

#[test]
fn env_file_supplies_credentials() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "CARCHIVE_API_URL=https://from-dotenv.example\n",
    )
    .unwrap();
    carchive(dir.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://from-dotenv.example"))
        .stdout(predicate::str::contains("(not set)"));
}
