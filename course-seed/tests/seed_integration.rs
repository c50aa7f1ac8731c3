use course_seed::cli::{enrolment_prerequisites, seed_enrolments, seed_profiles};
use course_seed::load_config::{
    ApiSettings, ContentDefaults, HandoffMode, SeedConfig, SeedPaths,
};
use course_seed_core::contract::{
    AuthSession, CourseRef, CreatedContent, MockAuthProvider, MockContentApi,
};
use course_seed_core::handoff::{CourseHandoff, HandoffStore, JsonFileStore};
use std::fs::write;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn config_in(dir: &Path) -> SeedConfig {
    SeedConfig {
        api: ApiSettings {
            base_url: "http://localhost:9".into(),
            api_key: "Bearer test".into(),
            channel_id: "chan".into(),
            client_id: "direct-grant".into(),
            client_secret: "secret".into(),
            grant_type: "password".into(),
            username: "creator@example.com".into(),
            password: "pw".into(),
        },
        content: ContentDefaults {
            channel_id: "chan".into(),
            created_by: "creator-id".into(),
            organisation: vec!["Org".into()],
            framework: "FMPS".into(),
            mime_type: "application/vnd.ekstep.ecml-archive".into(),
            creator: "Creator".into(),
        },
        paths: SeedPaths {
            learner_course_csv: dir.join("learner-profile-course.csv"),
            user_learner_csv: dir.join("user-learner-profile.csv"),
            question_csv: dir.join("questions.csv"),
            quiz_csv: dir.join("assessment_create.csv"),
            reports_dir: dir.join("reports"),
            env_file: dir.join(".env"),
            question_mapping: dir.join("question_mapping.json"),
            handoff: dir.join("reports/course-mappings.json"),
        },
        handoff_mode: HandoffMode::Json,
        wait_interval: Duration::ZERO,
    }
}

fn creator_auth() -> MockAuthProvider {
    let mut auth = MockAuthProvider::new();
    auth.expect_login().times(1).returning(|| {
        Ok(AuthSession {
            access_token: "creator-token".into(),
            user_id: Some("creator-id".into()),
        })
    });
    auth.expect_user_session().returning(|email: &str| {
        Ok(AuthSession {
            access_token: format!("token-{email}"),
            user_id: Some(format!("id-{email}")),
        })
    });
    auth
}

#[tokio::test]
async fn test_profiles_export_handoff_that_enrolment_consumes() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    write(
        &config.paths.learner_course_csv,
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n",
    )
    .unwrap();
    write(
        &config.paths.user_learner_csv,
        "email,learner_profile_code\nlearner@example.com,LP1\n",
    )
    .unwrap();

    let mut api = MockContentApi::new();
    api.expect_search_content().returning(|_, _| Ok(None));
    api.expect_search_course().returning(|_, _| {
        Ok(Some(CourseRef {
            identifier: "do_C1".into(),
            name: "Course 1".into(),
        }))
    });
    api.expect_open_batch()
        .times(1)
        .returning(|_, _| Ok(Some("batch_1".into())));
    api.expect_create_learner_profile().returning(|_, _| {
        Ok(CreatedContent {
            identifier: "do_LP1".into(),
            version_key: None,
        })
    });
    api.expect_update_learner_profile().returning(|_, _| Ok(()));
    api.expect_publish_content().returning(|_, _| Ok(()));
    api.expect_enrol()
        .times(1)
        .withf(|_, e| e.course_id == "do_C1" && e.batch_id == "batch_1")
        .returning(|_, _| Ok(()));

    let tally = seed_profiles(&config, &api, &creator_auth()).await.unwrap();
    assert_eq!(tally.success, 1);
    assert!(config.paths.handoff.is_file(), "course mappings exported");

    let (created, handoff) = enrolment_prerequisites(&config).expect("prerequisites met");
    assert!(created.contains("LP1"));
    assert_eq!(handoff.batch_of("LP1", "do_C1"), Some("batch_1"));

    let tally = seed_enrolments(&config, &api, &creator_auth(), &created, &handoff)
        .await
        .unwrap();
    assert_eq!(tally.success, 1);
    assert!(config.paths.report("enrollment-status.csv").is_file());
}

#[tokio::test]
async fn test_failed_run_overwrites_previous_course_mappings() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    write(
        &config.paths.learner_course_csv,
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n",
    )
    .unwrap();
    let mut stale = CourseHandoff::default();
    stale
        .course_mapping
        .entry("OLD".into())
        .or_default()
        .insert("do_old".into(), "Old".into());
    stale.node_to_code.insert("do_old".into(), "OLD_C".into());
    JsonFileStore::new(&config.paths.handoff).save(&stale).unwrap();

    let mut api = MockContentApi::new();
    api.expect_search_content().returning(|_, _| Ok(None));
    api.expect_search_course().returning(|_, _| Ok(None));
    api.expect_create_learner_profile().never();

    let tally = seed_profiles(&config, &api, &creator_auth()).await.unwrap();
    assert_eq!(tally.failure, 1);

    let (created, handoff) = enrolment_prerequisites(&config).expect("empty mappings still load");
    assert!(created.is_empty());
    assert!(handoff.is_empty(), "stale mappings replaced: {handoff:?}");
    assert!(handoff.node_to_code.is_empty());
}

#[test]
fn test_enrolment_requires_profile_report() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());

    let err = enrolment_prerequisites(&config).unwrap_err();
    assert!(
        err.to_string().contains("learner profile status report"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_enrolment_requires_complete_mappings() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    std::fs::create_dir_all(&config.paths.reports_dir).unwrap();
    write(
        config.paths.report("learner-profile-status.csv"),
        "learner_profile_code,learner_profile,course_code,expiry_date,status,reason\nLP1,One,C1,2030-01-01,Success,none\n",
    )
    .unwrap();

    let err = enrolment_prerequisites(&config).unwrap_err();
    assert!(
        format!("{err:#}").contains("course mappings are not available"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_failed_login_is_fatal() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    write(
        &config.paths.learner_course_csv,
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n",
    )
    .unwrap();

    let api = MockContentApi::new();
    let mut auth = MockAuthProvider::new();
    auth.expect_login().returning(|| {
        Err(course_seed_core::contract::ApiError::Remote {
            status: 401,
            message: "unauthorized".into(),
            errmsg: Some("Invalid user credentials".into()),
        })
    });

    let err = seed_profiles(&config, &api, &auth).await.unwrap_err();
    assert!(err.to_string().contains("Invalid user credentials"));
    assert!(
        !config.paths.report("learner-profile-status.csv").exists(),
        "no report is written when authentication fails"
    );
}
