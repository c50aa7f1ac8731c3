/// # course-seed CLI interface
///
/// Command parsing and phase orchestration for the `course-seed` binary. Each subcommand
/// runs one seeding script end to end: load configuration, read the input CSV,
/// authenticate, drive the phase in `course-seed-core`, and report where the status
/// reports were written.
///
/// All row-level behaviour (grouping, existence checks, workflows, reports) lives in
/// [`course_seed_core`]; this module only wires configuration, the HTTP client and the
/// handoff store together.
///
/// Row failures never fail the command. The process exits non-zero only for fatal
/// problems: invalid configuration, a missing prerequisite, failed authentication, an
/// unreadable input file or an unwritable report.
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::Path;

use course_seed_core::contract::{AuthProvider, AuthSession, ContentApi};
use course_seed_core::enrolment::{self, EnrolmentColumns, EnrolmentContext};
use course_seed_core::handoff::{CourseHandoff, EnvFileStore, HandoffStore, JsonFileStore};
use course_seed_core::input::{read_records, InputTable};
use course_seed_core::learner_profile::{self, ProfileColumns};
use course_seed_core::outcome::Tally;
use course_seed_core::question::{self, QuestionBank, QuestionColumns};
use course_seed_core::quiz::{self, QuizColumns};

use crate::client::SunbirdClient;
use crate::load_config::{load_config, HandoffMode, SeedConfig};

/// CLI for course-seed: seed a learning platform from CSV files.
#[derive(Parser)]
#[clap(
    name = "course-seed",
    version,
    about = "Create learner profiles, enrolments, questions and quizzes on a learning platform from CSV files"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create learner profiles from the learner/course CSV and export course mappings
    Profiles,
    /// Enrol users into the courses of their learner profiles
    Enrol,
    /// Create assessment questions only
    Questions,
    /// Create questions, then quizzes built from them
    Quizzes,
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config().context("failed to load configuration")?;

    match cli.command {
        Commands::Profiles => {
            tracing::info!(command = "profiles", "Starting learner profile creation");
            let client = SunbirdClient::new(&config)?;
            seed_profiles(&config, &client, &client).await?;
        }
        Commands::Enrol => {
            tracing::info!(command = "enrol", "Starting enrolment");
            let (created, handoff) = enrolment_prerequisites(&config)?;
            let client = SunbirdClient::new(&config)?;
            seed_enrolments(&config, &client, &client, &created, &handoff).await?;
        }
        Commands::Questions => {
            tracing::info!(command = "questions", "Starting question creation");
            let client = SunbirdClient::new(&config)?;
            seed_questions(&config, &client, &client).await?;
        }
        Commands::Quizzes => {
            tracing::info!(command = "quizzes", "Starting question and quiz creation");
            let client = SunbirdClient::new(&config)?;
            seed_quizzes(&config, &client, &client).await?;
        }
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<InputTable> {
    let table = read_records(path).with_context(|| format!("failed to read {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = table.records.len(), "Input loaded");
    Ok(table)
}

async fn authenticate<P: AuthProvider>(auth: &P) -> Result<AuthSession> {
    auth.login()
        .await
        .map_err(|e| anyhow::anyhow!("authentication failed: {}", e.user_message()))
}

fn print_summary(phase: &str, tally: &Tally, report: &Path) {
    println!(
        "{phase}: {} succeeded, {} failed, {} skipped. Report: {}",
        tally.success,
        tally.failure,
        tally.skipped,
        report.display()
    );
}

/// Handoff store selected by configuration.
pub fn handoff_store(config: &SeedConfig) -> Box<dyn HandoffStore> {
    match config.handoff_mode {
        HandoffMode::Env => Box::new(EnvFileStore::new(&config.paths.env_file)),
        HandoffMode::Json => Box::new(JsonFileStore::new(&config.paths.handoff)),
    }
}

/// Learner profile phase followed by the course mapping export.
pub async fn seed_profiles<A: ContentApi, P: AuthProvider>(
    config: &SeedConfig,
    api: &A,
    auth: &P,
) -> Result<Tally> {
    let table = read_input(&config.paths.learner_course_csv)?;
    let session = authenticate(auth).await?;
    let report = config.paths.report(learner_profile::REPORT_FILE);

    let outcome = learner_profile::run_profile_phase(
        api,
        &session,
        &table,
        ProfileColumns::default(),
        &report,
        config.wait_interval,
    )
    .await?;

    if outcome.handoff.is_empty() {
        tracing::warn!("No learner profiles were created, exporting empty course mappings");
    }
    handoff_store(config)
        .save(&outcome.handoff)
        .context("failed to export course mappings")?;
    print_summary("Learner profiles", &outcome.tally, &report);
    Ok(outcome.tally)
}

/// Checks the enrolment prerequisites: the profile status report and a complete
/// course mapping. Both are fatal when missing.
pub fn enrolment_prerequisites(config: &SeedConfig) -> Result<(HashSet<String>, CourseHandoff)> {
    let report = config.paths.report(learner_profile::REPORT_FILE);
    if !report.is_file() {
        tracing::error!(path = %report.display(), "Learner profile status report not found");
        bail!(
            "learner profile status report {} not found; run `course-seed profiles` first",
            report.display()
        );
    }
    let created = enrolment::successful_profiles(&report, &ProfileColumns::default().code)
        .with_context(|| format!("failed to read {}", report.display()))?;

    if config.handoff_mode == HandoffMode::Env && config.paths.env_file.is_file() {
        dotenvy::from_path_override(&config.paths.env_file).with_context(|| {
            format!("failed to load {}", config.paths.env_file.display())
        })?;
    }
    let handoff = handoff_store(config)
        .load()
        .context("course mappings are not available; run `course-seed profiles` first")?;

    tracing::info!(
        created_profiles = created.len(),
        mapped_profiles = handoff.course_mapping.len(),
        "Enrolment prerequisites satisfied"
    );
    Ok((created, handoff))
}

pub async fn seed_enrolments<A: ContentApi, P: AuthProvider>(
    config: &SeedConfig,
    api: &A,
    auth: &P,
    created_profiles: &HashSet<String>,
    handoff: &CourseHandoff,
) -> Result<Tally> {
    let users = read_input(&config.paths.user_learner_csv)?;
    let session = authenticate(auth).await?;
    let report = config.paths.report(enrolment::REPORT_FILE);

    let ctx = EnrolmentContext {
        api,
        auth,
        session: &session,
        created_profiles,
        handoff,
        columns: EnrolmentColumns::default(),
    };
    let tally = enrolment::run_enrolment_phase(&ctx, &users, &report, config.wait_interval).await?;
    print_summary("Enrolments", &tally, &report);
    Ok(tally)
}

async fn question_step<A: ContentApi>(
    config: &SeedConfig,
    api: &A,
    session: &AuthSession,
) -> Result<QuestionBank> {
    let table = read_input(&config.paths.question_csv)?;
    let report = config.paths.report(question::REPORT_FILE);
    let outcome = question::run_question_phase(
        api,
        session,
        &table,
        QuestionColumns::default(),
        &report,
        config.wait_interval,
    )
    .await?;
    question::save_question_mapping(&config.paths.question_mapping, &outcome.bank)?;
    print_summary("Questions", &outcome.tally, &report);
    Ok(outcome.bank)
}

pub async fn seed_questions<A: ContentApi, P: AuthProvider>(
    config: &SeedConfig,
    api: &A,
    auth: &P,
) -> Result<QuestionBank> {
    let session = authenticate(auth).await?;
    question_step(config, api, &session).await
}

/// Questions, the quiz/question status report, then quizzes, in one run.
pub async fn seed_quizzes<A: ContentApi, P: AuthProvider>(
    config: &SeedConfig,
    api: &A,
    auth: &P,
) -> Result<Tally> {
    let quizzes = read_input(&config.paths.quiz_csv)?;
    let session = authenticate(auth).await?;
    let bank = question_step(config, api, &session).await?;

    let columns = QuizColumns::default();
    question::write_quiz_question_status(
        &config.paths.report(question::QUIZ_QUESTION_REPORT_FILE),
        &quizzes,
        &columns.code,
        &columns.questions,
        &bank,
    )?;

    let report = config.paths.report(quiz::REPORT_FILE);
    let tally = quiz::run_quiz_phase(
        api,
        &session,
        &bank,
        &quizzes,
        columns,
        &report,
        config.wait_interval,
    )
    .await?;
    print_summary("Quizzes", &tally, &report);
    Ok(tally)
}
