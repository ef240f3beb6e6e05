//! CLI integration tests for cast-post

use assert_cmd::Command;
use libcrosscast::platforms::relay::generate_keys;
use libcrosscast::store::UserStore;
use libcrosscast::types::MicroblogBundle;
use libcrosscast::{CredentialVault, Database, User};
use predicates::prelude::*;
use secrecy::SecretString;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VAULT_KEY: &str = "cast-post-cli-test-key";

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
    db_path: PathBuf,
}

impl TestEnv {
    /// Isolated config and database; `microblog_api` enables the microblog
    /// platform against that base URL. No relays are configured.
    fn new(microblog_api: Option<&str>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("data").join("crosscast.db");

        let mut config = format!(
            r#"
[database]
path = "{}"

[relay]
relays = []
"#,
            escape_path_for_toml(&db_path.to_string_lossy())
        );
        if let Some(api_base) = microblog_api {
            config.push_str(&format!(
                r#"
[microblog]
consumer_key = "consumer-key"
consumer_secret = "consumer-secret"
callback_url = "https://example.org/callback"
api_base = "{}"
"#,
                api_base
            ));
        }
        fs::write(&config_path, config).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
            db_path,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cast-post").unwrap();
        cmd.env("CROSSCAST_CONFIG", &self.config_path);
        cmd.env("CROSSCAST_ENCRYPTION_KEY", VAULT_KEY);
        cmd.env_remove("CROSSCAST_USER");
        cmd
    }

    /// Create a user holding a microblog bundle and a relay key
    async fn seed_user(&self) -> String {
        let db = Database::open(&self.db_path).await.unwrap();
        let vault = CredentialVault::new(&SecretString::new(VAULT_KEY.into())).unwrap();

        let user = User::new();
        db.create_user(&user).await.unwrap();
        db.set_microblog_credentials(
            &user.id,
            &MicroblogBundle {
                token: vault.encrypt(b"user-token").unwrap(),
                secret: vault.encrypt(b"user-secret").unwrap(),
            },
        )
        .await
        .unwrap();

        let (relay_key, _) = generate_keys().unwrap();
        db.set_relay_key(&user.id, &vault.encrypt_str(&relay_key).unwrap())
            .await
            .unwrap();

        user.id
    }
}

async fn microblog_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    let template = if status < 300 {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "data": { "id": "1850000000000000001", "text": "hello" }
        }))
    } else {
        ResponseTemplate::new(status).set_body_string("Unauthorized")
    };

    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

#[test]
fn test_help_flag_output() {
    let mut cmd = Command::cargo_bin("cast-post").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Publish content to every linked platform at once",
        ))
        .stdout(predicate::str::contains("--user"))
        .stdout(predicate::str::contains("--media"))
        .stdout(predicate::str::contains("--format"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_to_microblog() {
    let server = microblog_server(201).await;
    let env = TestEnv::new(Some(&server.uri()));
    let user_id = env.seed_user().await;

    env.cmd()
        .args(["--user", &user_id, "Hello from the command line"])
        .assert()
        .success()
        .stdout(predicate::str::contains("microblog:1850000000000000001"))
        .stdout(predicate::str::contains("published"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reads_content_from_stdin_and_prints_json() {
    let server = microblog_server(201).await;
    let env = TestEnv::new(Some(&server.uri()));
    let user_id = env.seed_user().await;

    let output = env
        .cmd()
        .args(["--user", &user_id, "--format", "json"])
        .write_stdin("Piped content\n")
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "published");
    assert_eq!(report["results"]["microblog"]["status"], "success");
    assert_eq!(
        report["results"]["microblog"]["platform_post_id"],
        "1850000000000000001"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_platforms_failing_exits_1() {
    let server = microblog_server(401).await;
    let env = TestEnv::new(Some(&server.uri()));
    let user_id = env.seed_user().await;

    env.cmd()
        .args(["--user", &user_id, "Nobody will see this"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed"))
        .stderr(predicate::str::contains("Authentication failed"));
}

#[tokio::test]
async fn test_no_configured_platform_exits_3() {
    let env = TestEnv::new(None);
    let user_id = env.seed_user().await;

    env.cmd()
        .args(["--user", &user_id, "Going nowhere"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No platform is configured"));
}

#[tokio::test]
async fn test_empty_stdin_exits_3() {
    let env = TestEnv::new(None);
    let user_id = env.seed_user().await;

    env.cmd()
        .args(["--user", &user_id])
        .write_stdin("")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Content cannot be empty"));
}

#[tokio::test]
async fn test_content_too_long_exits_3() {
    let env = TestEnv::new(None);
    let user_id = env.seed_user().await;

    env.cmd()
        .args(["--user", &user_id, &"a".repeat(281)])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("exceeds 280 characters"));
}

#[tokio::test]
async fn test_unknown_user_exits_4() {
    let env = TestEnv::new(None);

    env.cmd()
        .args(["--user", "no-such-user", "Hello"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Not found: user no-such-user"));
}

#[test]
fn test_missing_encryption_key_fails_closed() {
    let env = TestEnv::new(None);

    env.cmd()
        .env_remove("CROSSCAST_ENCRYPTION_KEY")
        .args(["--user", "anyone", "Hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No encryption key supplied"));
}
