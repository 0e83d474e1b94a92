use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use notice_api::state::{AppState, AppStateInner};
use notice_api::storage::ImageStore;
use notice_db::Database;
use notice_db::directory::{
    NewStudent, add_group_member, insert_admin, insert_group, insert_guardian, insert_school,
    insert_student, link_guardian,
};
use notice_types::api::Claims;
use notice_types::models::Role;

const SECRET: &str = "test-secret";

struct TestApp {
    app: Router,
    state: AppState,
    school: i64,
    admin: i64,
    _images: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let images_dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let (school, admin) = db
            .with_conn(|c| {
                let school = insert_school(c, "Hillside")?;
                let admin = insert_admin(c, school, "office@hillside.test", "Office")?;
                Ok((school, admin))
            })
            .unwrap();
        let images = ImageStore::new(images_dir.path().to_path_buf()).await.unwrap();

        let state: AppState = Arc::new(AppStateInner {
            db,
            images,
            jwt_secret: SECRET.into(),
            max_image_bytes: 1024,
        });
        Self {
            app: notice_api::router(state.clone()),
            state,
            school,
            admin,
            _images: images_dir,
        }
    }

    fn token(&self, sub: i64, role: Role) -> String {
        token_for(sub, self.school, role)
    }

    fn admin_token(&self) -> String {
        self.token(self.admin, Role::Admin)
    }

    /// Group "7A" with students A and B; guardian ga of A, gb of B.
    fn seed_class(&self) -> Seed {
        self.state
            .db
            .with_conn(|c| {
                let group = insert_group(c, self.school, "7A", None)?;
                let mut students = Vec::new();
                for number in ["2024-001", "2024-002"] {
                    let s = NewStudent {
                        student_number: number,
                        email: None,
                        first_name: "Kid",
                        last_name: number,
                    };
                    let id = insert_student(c, self.school, &s)?;
                    add_group_member(c, group, id)?;
                    students.push(id);
                }
                let ga = insert_guardian(c, self.school, "ga@example.com", "GA")?;
                let gb = insert_guardian(c, self.school, "gb@example.com", "GB")?;
                link_guardian(c, ga, students[0])?;
                link_guardian(c, gb, students[1])?;
                Ok(Seed {
                    group,
                    students,
                    guardians: vec![ga, gb],
                })
            })
            .unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>) -> (StatusCode, Value,
    ) {
        let (status, _, bytes) = self.send_raw(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }
}

struct Seed {
    group: i64,
    students: Vec<i64>,
    guardians: Vec<i64>,
}

fn token_for(sub: i64, school_id: i64, role: Role) -> String {
    let claims = Claims {
        sub,
        school_id,
        role,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn post_body(group: i64) -> Value {
    json!({
        "title": "Sports day",
        "body": "Sports day is on Friday.",
        "priority": "high",
        "group_ids": [group],
    })
}

#[tokio::test]
async fn health_is_public_and_the_rest_needs_a_token() {
    let t = TestApp::new().await;

    let (status, _, body) = t.send_raw(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");

    let (status, _) = t.send(Method::GET, "/posts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.send(Method::GET, "/posts", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_enforced() {
    let t = TestApp::new().await;
    let seed = t.seed_class();
    let guardian = t.token(seed.guardians[0], Role::Guardian);

    let (status, _) = t
        .send(Method::POST, "/posts", Some(&guardian), Some(post_body(seed.group)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .send(Method::GET, "/notifications/pending", Some(&t.admin_token()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_view_and_report() {
    let t = TestApp::new().await;
    let seed = t.seed_class();
    let admin = t.admin_token();

    let (status, created) = t
        .send(Method::POST, "/posts", Some(&admin), Some(post_body(seed.group)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["recipients"], 2);
    assert_eq!(created["deliveries"], 2);
    assert_eq!(created["post"]["read_percent"], 0.0);
    let post_id = created["post"]["id"].as_i64().unwrap();

    let guardian = t.token(seed.guardians[0], Role::Guardian);
    let (status, inbox) = t.send(Method::GET, "/guardian/posts", Some(&guardian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox["total"], 1);
    assert_eq!(inbox["items"][0]["read"], false);

    let uri = format!("/guardian/posts/{}/view", post_id);
    let (status, viewed) = t.send(Method::POST, &uri, Some(&guardian), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(viewed["updated"], 1);

    let (_, again) = t.send(Method::POST, &uri, Some(&guardian), Some(json!({}))).await;
    assert_eq!(again["updated"], 0);
    assert_eq!(again["viewed_at"], viewed["viewed_at"]);

    let (status, detail) = t
        .send(Method::GET, &format!("/posts/{}", post_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["read_count"], 1);
    assert_eq!(detail["unread_count"], 1);
    assert_eq!(detail["read_percent"], 50.0);

    let (_, groups) = t
        .send(Method::GET, &format!("/posts/{}/stats/groups", post_id), Some(&admin), None)
        .await;
    assert_eq!(groups[0]["group_name"], "7A");
    assert_eq!(groups[0]["read_students"], 1);

    let (_, students) = t
        .send(Method::GET, &format!("/posts/{}/stats/students", post_id), Some(&admin), None)
        .await;
    assert_eq!(students.as_array().unwrap().len(), 2);

    let (_, recipients) = t
        .send(
            Method::GET,
            &format!("/posts/{}/recipients?student_number=002&per_page=5", post_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(recipients["total"], 1);
    assert_eq!(recipients["items"][0]["student_id"], seed.students[1]);
    assert_eq!(recipients["items"][0]["origin_group_name"], "7A");
}

#[tokio::test]
async fn other_schools_see_nothing() {
    let t = TestApp::new().await;
    let seed = t.seed_class();
    let (_, created) = t
        .send(Method::POST, "/posts", Some(&t.admin_token()), Some(post_body(seed.group)))
        .await;
    let post_id = created["post"]["id"].as_i64().unwrap();

    let other_school = t.state.db.with_conn(|c| insert_school(c, "Elsewhere")).unwrap();
    let outsider = token_for(99, other_school, Role::Admin);
    let (status, _) = t
        .send(Method::GET, &format!("/posts/{}", post_id), Some(&outsider), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .send(Method::POST, "/posts", Some(&outsider), Some(post_body(seed.group)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let t = TestApp::new().await;
    let admin = t.admin_token();

    let mut body = post_body(1);
    body["priority"] = json!("urgent");
    let (status, _) = t.send(Method::POST, "/posts", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "title": "  ", "body": "x", "priority": "low" });
    let (status, _) = t.send(Method::POST, "/posts", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn targeting_change_and_retry() {
    let t = TestApp::new().await;
    let seed = t.seed_class();
    let admin = t.admin_token();
    let (_, created) = t
        .send(Method::POST, "/posts", Some(&admin), Some(post_body(seed.group)))
        .await;
    let post_id = created["post"]["id"].as_i64().unwrap();

    let uri = format!("/posts/{}/targeting", post_id);
    let (status, cleared) = t
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "group_ids": [] })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["recipients_removed"], 2);
    assert_eq!(cleared["deliveries_removed"], 2);

    let (_, restored) = t
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "group_ids": [seed.group] })))
        .await;
    assert_eq!(restored["recipients_added"], 2);

    let retry = format!("/posts/{}/retry/guardians/{}", post_id, seed.guardians[0]);
    let (status, body) = t.send(Method::POST, &retry, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let retry = format!("/posts/{}/retry/groups/{}", post_id, 9999);
    let (status, _) = t.send(Method::POST, &retry, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_is_stored_served_and_removed() {
    let t = TestApp::new().await;
    let admin = t.admin_token();
    let png = b"\x89PNG\r\n\x1a\nnot really a png";

    let mut body = json!({ "title": "Photo day", "body": "Smile.", "priority": "low" });
    body["image"] = json!({ "mime_type": "image/png", "data": B64.encode(png) });
    let (status, created) = t.send(Method::POST, "/posts", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = created["post"]["id"].as_i64().unwrap();
    let image_url = created["post"]["image_url"].as_str().unwrap().to_string();
    assert_eq!(image_url, format!("/posts/{}/image", post_id));

    let (status, headers, bytes) = t.send_raw(Method::GET, &image_url, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(&bytes[..], png);

    let (status, _) = t
        .send(Method::DELETE, &format!("/posts/{}", post_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.send(Method::GET, &image_url, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unacceptable_images_write_nothing() {
    let t = TestApp::new().await;
    let admin = t.admin_token();

    let mut body = json!({ "title": "Doc", "body": "See attached.", "priority": "low" });
    body["image"] = json!({ "mime_type": "application/pdf", "data": B64.encode(b"%PDF") });
    let (status, _) = t.send(Method::POST, "/posts", Some(&admin), Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    body["image"] = json!({ "mime_type": "image/png", "data": B64.encode(vec![0u8; 2048]) });
    let (status, _) = t.send(Method::POST, "/posts", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (_, list) = t.send(Method::GET, "/posts", Some(&admin), None).await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn import_strict_and_lenient() {
    let t = TestApp::new().await;
    t.seed_class();
    let admin = t.admin_token();
    let rows = json!([
        {
            "line": 2, "title": "Trip", "description": "Zoo",
            "priority": "high", "group_name": "7A"
        },
        {
            "line": 3, "title": "Trip", "description": "Zoo",
            "priority": "high", "student_number": "2024-002"
        },
        {
            "line": 4, "title": "Exam", "description": "Maths",
            "priority": "low", "group_name": "9Z"
        },
    ]);

    let (status, report) = t
        .send(Method::POST, "/posts/import", Some(&admin), Some(json!({ "rows": rows.clone() })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(report["created_post_ids"], json!([]));
    assert_eq!(report["errors"][0]["line"], 4);

    let (status, report) = t
        .send(
            Method::POST,
            "/posts/import",
            Some(&admin),
            Some(json!({ "mode": "lenient", "rows": rows })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created_post_ids"].as_array().unwrap().len(), 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn worker_and_directory_endpoints() {
    let t = TestApp::new().await;
    let seed = t.seed_class();
    let admin = t.admin_token();
    let service = t.token(0, Role::Service);
    let (_, created) = t
        .send(Method::POST, "/posts", Some(&admin), Some(post_body(seed.group)))
        .await;
    let post_id = created["post"]["id"].as_i64().unwrap();

    let (status, pending) = t
        .send(Method::GET, "/notifications/pending?limit=10", Some(&service), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = pending
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["delivery_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);

    let sent_body = json!({ "delivery_ids": ids });
    let (_, sent) = t
        .send(Method::POST, "/notifications/sent", Some(&service), Some(sent_body))
        .await;
    assert_eq!(sent["updated"], 2);
    let (_, pending) = t.send(Method::GET, "/notifications/pending", Some(&service), None).await;
    assert_eq!(pending, json!([]));

    // a late guardian for student A
    let late = t
        .state
        .db
        .with_conn(|c| {
            let g = insert_guardian(c, t.school, "late@example.com", "Late")?;
            link_guardian(c, g, seed.students[0])?;
            Ok(g)
        })
        .unwrap();
    let event = json!({
        "type": "GuardianLinked",
        "data": { "student_id": seed.students[0], "guardian_id": late },
    });
    let (status, applied) = t
        .send(Method::POST, "/directory/events", Some(&service), Some(event))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["deliveries_added"], 1);

    let late_token = t.token(late, Role::Guardian);
    let (_, inbox) = t.send(Method::GET, "/guardian/posts", Some(&late_token), None).await;
    assert_eq!(inbox["items"][0]["post_id"], post_id);
}
