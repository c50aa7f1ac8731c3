use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::TempDir;

/// Binary with a clean environment holding only the settings every subcommand needs.
fn seed_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("course-seed").expect("Binary exists");
    cmd.current_dir(dir.path())
        .env_clear()
        .env("API_KEY", "Bearer test")
        .env("USERNAME", "creator@example.com")
        .env("PASSWORD", "pw")
        .env("CLIENT_SECRET", "secret")
        .env("CHANNEL_ID", "chan")
        .env("CREATED_BY", "creator-id")
        .env("BASE_URL", "http://127.0.0.1:9")
        .env("REPORTS_DIR", dir.path().join("reports"))
        .env("ENV_FILE", dir.path().join(".env"));
    cmd
}

#[test]
fn enrol_without_profile_report_exits_non_zero() {
    let dir = TempDir::new().unwrap();

    seed_cmd(&dir)
        .arg("enrol")
        .assert()
        .failure()
        .stderr(predicate::str::contains("learner profile status report"));
}

#[test]
fn enrol_without_course_mappings_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("reports")).unwrap();
    write(
        dir.path().join("reports/learner-profile-status.csv"),
        "learner_profile_code,learner_profile,course_code,expiry_date,status,reason\nLP1,One,C1,2030-01-01,Success,none\n",
    )
    .unwrap();

    seed_cmd(&dir)
        .arg("enrol")
        .assert()
        .failure()
        .stderr(predicate::str::contains("course mappings are not available"));
}

#[test]
fn missing_secret_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();

    seed_cmd(&dir)
        .env_remove("API_KEY")
        .arg("profiles")
        .assert()
        .failure()
        .stderr(predicate::str::contains("API_KEY"));
}

#[test]
fn unreadable_input_exits_non_zero() {
    let dir = TempDir::new().unwrap();

    seed_cmd(&dir)
        .env("LEARNER_COURSE_CSV_PATH", dir.path().join("missing.csv"))
        .arg("profiles")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.csv"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    let dir = TempDir::new().unwrap();

    seed_cmd(&dir).arg("sync").assert().failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use course_seed::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Enrol,
    };
    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
