use course_seed_core::contract::{
    ApiError, AuthSession, ContentSummary, CourseRef, CreatedContent, MockContentApi,
};
use course_seed_core::input::parse_records;
use course_seed_core::learner_profile::{run_profile_phase, ProfileColumns, REPORT_FILE};
use course_seed_core::report::read_report;
use std::time::Duration;
use tempfile::tempdir;

const PROFILES_CSV: &str = "\
learner_profile_code,learner_profile,course_code,expiry_date
LP1,Profile One,\"C1, C2\",2030-01-01
LP1,Profile One,C2,2030-01-01
LP2,Profile Two,C3,2030-01-01
,Nameless,C1,2030-01-01
";

fn session() -> AuthSession {
    AuthSession {
        access_token: "token".into(),
        user_id: Some("creator".into()),
    }
}

fn find_row<'a>(rows: &'a [Vec<String>], code: &str, name: &str) -> &'a Vec<String> {
    rows.iter()
        .find(|r| r[0] == code && r[1] == name)
        .unwrap_or_else(|| panic!("no report row for {code}/{name}: {rows:?}"))
}

#[tokio::test]
async fn test_profiles_are_created_once_per_code() {
    let table = parse_records(PROFILES_CSV.as_bytes()).expect("parse");
    let dir = tempdir().unwrap();
    let report = dir.path().join(REPORT_FILE);

    let mut api = MockContentApi::new();
    api.expect_search_content()
        .times(2)
        .returning(|_, _| Ok(None));
    api.expect_search_course()
        .returning(|_: &AuthSession, code: &str| match code {
            "C3" => Ok(None),
            other => Ok(Some(CourseRef {
                identifier: format!("do_{other}"),
                name: format!("Course {other}"),
            })),
        });
    api.expect_open_batch()
        .returning(|_: &AuthSession, course_id: &str| Ok(Some(format!("batch_{course_id}"))));
    api.expect_create_learner_profile()
        .times(1)
        .withf(|_, p| p.code == "LP1" && p.children == vec!["do_C1", "do_C2"])
        .returning(|_, _| {
            Ok(CreatedContent {
                identifier: "do_LP1".into(),
                version_key: None,
            })
        });
    api.expect_update_learner_profile()
        .times(1)
        .withf(|_, u| u.identifier == "do_LP1" && u.courses.len() == 2)
        .returning(|_, _| Ok(()));
    api.expect_publish_content()
        .times(1)
        .returning(|_, _| Ok(()));

    let outcome = run_profile_phase(
        &api,
        &session(),
        &table,
        ProfileColumns::default(),
        &report,
        Duration::ZERO,
    )
    .await
    .expect("phase should finish");

    assert_eq!(outcome.tally.success, 2);
    assert_eq!(outcome.tally.failure, 2);

    let (header, rows) = read_report(&report).expect("report");
    assert_eq!(
        header,
        vec![
            "learner_profile_code",
            "learner_profile",
            "course_code",
            "expiry_date",
            "status",
            "reason"
        ]
    );
    assert_eq!(rows.len(), 4, "one report row per input row");
    assert_eq!(rows[0][4], "Failure");
    assert_eq!(rows[0][5], "Learner profile code input is missing");
    let lp1_rows: Vec<&Vec<String>> = rows.iter().filter(|r| r[0] == "LP1").collect();
    assert_eq!(lp1_rows.len(), 2);
    for row in lp1_rows {
        assert_eq!((row[4].as_str(), row[5].as_str()), ("Success", "none"));
    }
    let lp2 = find_row(&rows, "LP2", "Profile Two");
    assert_eq!(lp2[4], "Failure");
    assert_eq!(
        lp2[5],
        "failed processing dependency C3: Course not found for code: C3"
    );

    let handoff = outcome.handoff;
    assert_eq!(handoff.course_mapping.len(), 1, "only created profiles are exported");
    assert_eq!(
        handoff.courses_of("LP1"),
        vec![
            ("do_C1".to_string(), "C1".to_string()),
            ("do_C2".to_string(), "C2".to_string())
        ]
    );
    assert_eq!(handoff.batch_of("LP1", "do_C2"), Some("batch_do_C2"));
}

#[tokio::test]
async fn test_existing_profile_is_skipped_without_mutations() {
    let table = parse_records(
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n"
            .as_bytes(),
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let report = dir.path().join(REPORT_FILE);

    let mut api = MockContentApi::new();
    api.expect_search_content().times(1).returning(|_, _| {
        Ok(Some(ContentSummary {
            identifier: "do_existing".into(),
            kind: None,
            item_type: None,
            max_score: None,
        }))
    });
    api.expect_search_course().never();
    api.expect_create_learner_profile().never();
    api.expect_update_learner_profile().never();
    api.expect_publish_content().never();

    let outcome = run_profile_phase(
        &api,
        &session(),
        &table,
        ProfileColumns::default(),
        &report,
        Duration::ZERO,
    )
    .await
    .unwrap();

    assert_eq!(outcome.tally.skipped, 1);
    assert!(outcome.handoff.is_empty());
    let (_, rows) = read_report(&report).unwrap();
    assert_eq!(rows[0][4], "Skipped");
    assert_eq!(rows[0][5], "Content with the code LP1 already exists");
}

#[tokio::test]
async fn test_failed_step_stops_workflow_and_reports_platform_message() {
    let table = parse_records(
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n"
            .as_bytes(),
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let report = dir.path().join(REPORT_FILE);

    let mut api = MockContentApi::new();
    api.expect_search_content().returning(|_, _| Ok(None));
    api.expect_search_course().returning(|_, _| {
        Ok(Some(CourseRef {
            identifier: "do_C1".into(),
            name: "Course".into(),
        }))
    });
    api.expect_open_batch()
        .returning(|_, _| Err(ApiError::Transport("timeout".into())));
    api.expect_create_learner_profile().returning(|_, _| {
        Ok(CreatedContent {
            identifier: "do_LP1".into(),
            version_key: None,
        })
    });
    api.expect_update_learner_profile().returning(|_, _| {
        Err(ApiError::Remote {
            status: 400,
            message: "CLIENT_ERROR".into(),
            errmsg: Some("Invalid hierarchy".into()),
        })
    });
    api.expect_publish_content().never();

    let outcome = run_profile_phase(
        &api,
        &session(),
        &table,
        ProfileColumns::default(),
        &report,
        Duration::ZERO,
    )
    .await
    .unwrap();

    assert_eq!(outcome.tally.failure, 1);
    assert!(outcome.handoff.is_empty());
    let (_, rows) = read_report(&report).unwrap();
    assert_eq!(rows[0][4], "Failure");
    assert_eq!(rows[0][5], "Invalid hierarchy");
}

#[tokio::test]
async fn test_search_error_is_a_failure_not_a_skip() {
    let table = parse_records(
        "learner_profile_code,learner_profile,course_code,expiry_date\nLP1,One,C1,2030-01-01\n"
            .as_bytes(),
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let report = dir.path().join(REPORT_FILE);

    let mut api = MockContentApi::new();
    api.expect_search_content()
        .returning(|_, _| Err(ApiError::Transport("connection reset".into())));
    api.expect_create_learner_profile().never();

    let outcome = run_profile_phase(
        &api,
        &session(),
        &table,
        ProfileColumns::default(),
        &report,
        Duration::ZERO,
    )
    .await
    .unwrap();

    assert_eq!(outcome.tally.failure, 1);
    let (_, rows) = read_report(&report).unwrap();
    assert_eq!(rows[0][5], "transport error: connection reset");
}

#[tokio::test]
async fn test_rows_wider_than_the_header_are_reported() {
    let table = parse_records(
        "learner_profile_code,learner_profile,course_code,expiry_date\n\
         LP1,One,C1,2030-01-01\n\
         LP2,Two,C2,2030-01-01,\n\
         LP3,Three,C3,2030-01-01,note\n"
            .as_bytes(),
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let report = dir.path().join(REPORT_FILE);

    let mut api = MockContentApi::new();
    api.expect_search_content().times(3).returning(|_, _| Ok(None));
    api.expect_search_course()
        .returning(|_: &AuthSession, code: &str| {
            Ok(Some(CourseRef {
                identifier: format!("do_{code}"),
                name: format!("Course {code}"),
            }))
        });
    api.expect_open_batch().returning(|_, _| Ok(None));
    api.expect_create_learner_profile()
        .times(3)
        .returning(|_, p| {
            Ok(CreatedContent {
                identifier: format!("do_{}", p.code),
                version_key: None,
            })
        });
    api.expect_update_learner_profile()
        .times(3)
        .returning(|_, _| Ok(()));
    api.expect_publish_content()
        .times(3)
        .returning(|_, _| Ok(()));

    let outcome = run_profile_phase(
        &api,
        &session(),
        &table,
        ProfileColumns::default(),
        &report,
        Duration::ZERO,
    )
    .await
    .expect("wide rows must not abort the phase");

    assert_eq!(outcome.tally.success, 3);
    assert_eq!(outcome.handoff.course_mapping.len(), 3);
    let (_, rows) = read_report(&report).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(find_row(&rows, "LP2", "Two")[4], "Success");
    assert_eq!(
        &find_row(&rows, "LP3", "Three")[4..],
        ["note", "Success", "none"]
    );
}
