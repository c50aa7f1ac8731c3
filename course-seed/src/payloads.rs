//! Request bodies for the platform's content, assessment and course APIs.
//!
//! Every builder returns a `serde_json::Value` ready to be sent as the JSON body. The
//! ECML quiz body is the only non-trivial one: it embeds each question item (as read
//! back from the assessment API) into a question-set stage followed by a summary stage.

use course_seed_core::contract::{
    Enrolment, LearnerProfileUpdate, NewLearnerProfile, NewQuestion, NewQuiz, QuizUpdate,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::load_config::ContentDefaults;

pub const SEARCH_STATUSES: [&str; 7] = [
    "Draft",
    "FlagDraft",
    "Review",
    "Processing",
    "Live",
    "Unlisted",
    "FlagReview",
];

const QUESTION_PLUGIN: &str = "org.ekstep.questionunit.mcq";
const QUESTION_PLUGIN_VERSION: &str = "1.3";
const START_STAGE_ID: &str = "d9ae4d48-389a-4757-867c-dc6a4beae92e";
const QUESTION_SET_ID: &str = "6d187a84-6ee0-4513-96ce-1d856e187c9b";
const SUMMARY_STAGE_ID: &str = "summary_stage_id";
const STAGE_CONFIG: &str = r##"{"opacity":100,"strokeWidth":1,"stroke":"rgba(255, 255, 255, 0)","autoplay":false,"visible":true,"color":"#FFFFFF","genieControls":false,"instructions":""}"##;
const SUMMARY_CONFIG: &str =
    r#"{"opacity":100,"strokeWidth":1,"stroke":"rgba(255, 255, 255, 0)","autoplay":false,"visible":true}"#;

/// Search for any content node created by us with this code.
pub fn content_search(code: &str, created_by: &str) -> Value {
    json!({
        "request": {
            "filters": {
                "status": SEARCH_STATUSES,
                "code": code,
                "createdBy": created_by,
            },
            "offset": 0,
            "limit": 1,
            "query": "",
            "sort_by": { "lastUpdatedOn": "desc" },
        }
    })
}

/// Search for a course by code.
pub fn course_search(code: &str, created_by: &str) -> Value {
    json!({
        "request": {
            "filters": {
                "status": SEARCH_STATUSES,
                "code": code,
                "createdBy": created_by,
                "primaryCategory": ["Course"],
                "objectType": "Content",
            },
            "offset": 0,
            "limit": 1,
            "query": "",
            "sort_by": { "lastUpdatedOn": "desc" },
        }
    })
}

/// Open batches of a course, newest first.
pub fn batch_list(course_id: &str) -> Value {
    json!({
        "request": {
            "filters": {
                "status": "1",
                "courseId": course_id,
                "enrollmentType": "open",
            },
            "sort_by": { "createdDate": "desc" },
        }
    })
}

pub fn learner_profile_create(defaults: &ContentDefaults, profile: &NewLearnerProfile) -> Value {
    let children: Vec<Value> = profile
        .children
        .iter()
        .enumerate()
        .map(|(index, id)| json!({ "identifier": id, "index": index }))
        .collect();
    json!({
        "request": {
            "collection": {
                "name": profile.name,
                "code": profile.code,
                "description": "Enter description for Learner Profile",
                "createdBy": defaults.created_by,
                "organisation": defaults.organisation,
                "createdFor": [defaults.channel_id],
                "framework": defaults.framework,
                "mimeType": "application/vnd.ekstep.content-collection",
                "creator": defaults.creator,
                "expiry_date": profile.expiry_date,
                "primaryCategory": "Learner Profile",
                "children": children,
            }
        }
    })
}

/// Hierarchy update attaching the resolved courses under the profile root.
pub fn learner_profile_hierarchy(update: &LearnerProfileUpdate) -> Value {
    let mut hierarchy = serde_json::Map::new();
    hierarchy.insert(
        update.identifier.clone(),
        json!({
            "name": update.name,
            "children": update.courses.iter().map(|c| c.identifier.as_str()).collect::<Vec<_>>(),
            "root": true,
        }),
    );
    for course in &update.courses {
        hierarchy.insert(
            course.identifier.clone(),
            json!({ "name": course.name, "children": [], "root": false }),
        );
    }

    let mut modified = serde_json::Map::new();
    modified.insert(
        update.identifier.clone(),
        json!({
            "root": true,
            "objectType": "Content",
            "isNew": false,
            "metadata": {
                "name": update.name,
                "code": update.code,
                "primaryCategory": "Learner Profile",
            },
        }),
    );

    json!({
        "request": {
            "data": {
                "nodesModified": modified,
                "hierarchy": hierarchy,
            }
        }
    })
}

pub fn quiz_create(defaults: &ContentDefaults, quiz: &NewQuiz) -> Value {
    json!({
        "request": {
            "content": {
                "code": quiz.code,
                "name": quiz.name,
                "maxAttempts": quiz.max_attempts,
                "description": "Enter description for Assessment",
                "createdBy": defaults.created_by,
                "organisation": defaults.organisation,
                "createdFor": [defaults.channel_id],
                "framework": defaults.framework,
                "mimeType": defaults.mime_type,
                "creator": defaults.creator,
                "contentType": quiz.content_type,
                "language": [quiz.language],
            }
        }
    })
}

fn plugins() -> Value {
    json!([
        { "identifier": QUESTION_PLUGIN, "semanticVersion": QUESTION_PLUGIN_VERSION },
        { "identifier": "org.ekstep.questionset", "semanticVersion": "1.0" },
        { "identifier": "org.ekstep.summary", "semanticVersion": "1.0" },
        { "identifier": "org.ekstep.navigation", "semanticVersion": "1.0" },
    ])
}

/// ECML representation of one question inside the question set. `None` when the item's
/// stored body cannot be parsed.
pub fn question_element(item: &Value) -> Option<Value> {
    let identifier = item.get("identifier")?.as_str()?;
    let body: Value = match item.get("body").and_then(Value::as_str) {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(body) => body,
            Err(e) => {
                warn!(identifier, error = %e, "Question body is not valid JSON");
                return None;
            }
        },
        None => return None,
    };
    let data = body.pointer("/data/data")?;
    let config = body.pointer("/data/config")?;
    Some(json!({
        "id": identifier,
        "type": "mcq",
        "pluginId": QUESTION_PLUGIN,
        "pluginVer": QUESTION_PLUGIN_VERSION,
        "templateId": "horizontalMCQ",
        "data": { "__cdata": data.to_string() },
        "config": { "__cdata": config.to_string() },
        "w": 80,
        "h": 85,
        "x": 9,
        "y": 6,
    }))
}

/// ECML theme holding a question-set stage and a summary stage.
pub fn quiz_body(update: &QuizUpdate) -> Value {
    let questions: Vec<Value> = update.items.iter().filter_map(question_element).collect();
    let set_config = json!({
        "title": update.name,
        "max_score": update.total_score,
        "allow_skip": true,
        "show_feedback": false,
        "shuffle_questions": false,
        "shuffle_options": false,
        "total_items": update.questions.len(),
        "btn_edit": "Edit",
    });

    json!({
        "theme": {
            "id": "theme",
            "version": "1.0",
            "startStage": START_STAGE_ID,
            "stage": [
                {
                    "x": 0, "y": 0, "w": 100, "h": 100,
                    "id": START_STAGE_ID,
                    "rotate": null,
                    "config": { "__cdata": STAGE_CONFIG },
                    "param": [{ "name": "next", "value": SUMMARY_STAGE_ID }],
                    "manifest": { "media": [] },
                    "org.ekstep.questionset": [{
                        "x": 9, "y": 6, "w": 80, "h": 85,
                        "rotate": 0,
                        "z-index": 0,
                        "id": QUESTION_SET_ID,
                        "data": { "__cdata": Value::Array(update.items.clone()).to_string() },
                        "config": { "__cdata": set_config.to_string() },
                        "org.ekstep.question": questions,
                    }],
                },
                {
                    "x": 0, "y": 0, "w": 100, "h": 100,
                    "rotate": null,
                    "config": { "__cdata": STAGE_CONFIG },
                    "id": SUMMARY_STAGE_ID,
                    "manifest": { "media": [{ "assetId": "summaryImage" }] },
                    "org.ekstep.summary": [{
                        "config": { "__cdata": SUMMARY_CONFIG },
                        "id": "summary_plugin_id",
                        "rotate": 0,
                        "x": 6.69, "y": -27.9, "w": 77.45, "h": 125.53,
                        "z-index": 0,
                    }],
                },
            ],
            "manifest": { "media": [] },
            "plugin-manifest": { "plugin": plugins() },
            "compatibilityVersion": 2,
        }
    })
}

pub fn quiz_update(defaults: &ContentDefaults, update: &QuizUpdate) -> Value {
    let questions: Vec<Value> = update
        .questions
        .iter()
        .map(|q| json!({ "identifier": q.identifier }))
        .collect();
    let editor_state = json!({
        "plugin": { "noOfExtPlugins": 0, "extPlugins": [] },
        "stage": { "noOfStages": 2, "currentStage": START_STAGE_ID, "selectedPluginObject": QUESTION_SET_ID },
        "sidebar": { "selectedMenu": "settings" },
    });
    json!({
        "request": {
            "content": {
                "versionKey": update.version_key.clone().unwrap_or_default(),
                "lastUpdatedBy": defaults.created_by,
                "stageIcons": "",
                "totalQuestions": update.questions.len(),
                "totalScore": update.total_score,
                "questions": questions,
                "assets": [],
                "editorState": editor_state.to_string(),
                "pragma": [],
                "plugins": plugins(),
                "body": quiz_body(update).to_string(),
                "copyright": defaults.organisation.first().cloned().unwrap_or_default(),
                "organisation": defaults.organisation,
                "consumerId": defaults.created_by,
            }
        }
    })
}

pub fn question_create(defaults: &ContentDefaults, question: &NewQuestion) -> Value {
    let options: Vec<Value> = question
        .options
        .iter()
        .map(|o| {
            json!({
                "answer": o.is_correct,
                "value": { "type": "text", "asset": format!("<p>{}</p>", o.text) },
            })
        })
        .collect();
    let body_options: Vec<Value> = question
        .options
        .iter()
        .map(|o| json!({ "text": format!("<p>{}</p>", o.text), "isCorrect": o.is_correct }))
        .collect();
    let config = json!({
        "metadata": {
            "max_score": question.max_score,
            "isShuffleOption": false,
            "isPartialScore": true,
            "evalUnordered": false,
            "templateType": "Horizontal",
            "name": question.title,
            "title": question.title,
            "category": "MCQ",
        },
        "max_time": 0,
        "max_score": question.max_score,
        "partial_scoring": true,
        "layout": "Horizontal",
        "isShuffleOption": false,
        "questionCount": 1,
    });
    let body = json!({
        "data": {
            "plugin": {
                "id": QUESTION_PLUGIN,
                "version": QUESTION_PLUGIN_VERSION,
                "templateId": "horizontalMCQ",
            },
            "data": {
                "question": { "text": format!("<p>{}</p>", question.title) },
                "options": body_options,
            },
            "config": config,
            "media": [],
        }
    });

    json!({
        "request": {
            "assessment_item": {
                "objectType": "AssessmentItem",
                "metadata": {
                    "code": question.code,
                    "name": question.title,
                    "title": question.title,
                    "question": format!("<p>{}</p>", question.title),
                    "type": "mcq",
                    "itemType": "UNIT",
                    "category": "MCQ",
                    "version": 2,
                    "template_id": "NA",
                    "qlevel": "EASY",
                    "max_score": question.max_score,
                    "isShuffleOption": false,
                    "isPartialScore": true,
                    "evalUnordered": false,
                    "templateType": "Horizontal",
                    "createdBy": defaults.created_by,
                    "channel": defaults.channel_id,
                    "organisation": defaults.organisation,
                    "framework": defaults.framework,
                    "options": options,
                    "body": body.to_string(),
                    "media": [],
                }
            }
        }
    })
}

pub fn review() -> Value {
    json!({ "request": { "content": {} } })
}

pub fn publish(defaults: &ContentDefaults) -> Value {
    json!({ "request": { "content": { "lastPublishedBy": defaults.created_by } } })
}

pub fn enrol(enrolment: &Enrolment) -> Value {
    json!({
        "request": {
            "courseId": enrolment.course_id,
            "batchId": enrolment.batch_id,
            "userId": enrolment.user_id,
        }
    })
}
