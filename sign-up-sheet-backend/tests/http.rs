use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt as _, Full};
use sign_up_sheet_backend::session::user_cookie;
use sign_up_sheet_backend::{handle, AppState};
use sign_up_sheet_config::{Config, MEMORY_DATABASE};
use sign_up_sheet_database::models::{Assignment, NewAssignment, NewTopic, Role, Topic, TopicAttributes, User};
use sign_up_sheet_database::repo::{MemoryRepo, TopicsRepo as _, UsersRepo as _};

const SECRET: &[u8] = b"an http test secret of enough length";
const CSRF: &str = "Ab3dEf6hIj9kLm2oPq5sTu8wXy1zAb";

struct Server {
    state: AppState,
    repo: MemoryRepo,
    assignment: Assignment,
    instructor: User,
}

impl Server {
    fn new() -> Self {
        let repo = MemoryRepo::new();
        let instructor = repo.user_insert("instructor6", Role::Instructor).unwrap();
        let assignment = repo
            .assignment_insert(NewAssignment {
                name: "OSS project".to_owned(),
                instructor_id: instructor.id,
                is_intelligent: false,
                staggered_deadline: false,
                microtask: false,
                max_team_size: 3,
            })
            .unwrap();
        let state = AppState::new(Arc::new(repo.clone()), SECRET).unwrap();
        Self {
            state,
            repo,
            assignment,
            instructor,
        }
    }

    fn student(&self, name: &str) -> User {
        let user = self.repo.user_insert(name, Role::Student).unwrap();
        self.repo
            .participant_insert(self.assignment.id, user.id)
            .unwrap();
        user
    }

    async fn topic(&self, name: &str, max_choosers: i32) -> Topic {
        self.repo
            .topic_create(NewTopic {
                assignment_id: self.assignment.id,
                attributes: TopicAttributes {
                    topic_identifier: "E1".to_owned(),
                    topic_name: name.to_owned(),
                    max_choosers,
                    ..TopicAttributes::default()
                },
                private_to: None,
            })
            .await
            .unwrap()
    }

    fn cookies(&self, user: &User, extra: &str) -> String {
        let user_cookie = user_cookie(self.state.key(), user.id);
        format!("__Host_csrf_token={CSRF}; {}{extra}", user_cookie.stripped())
    }

    async fn get(&self, user: Option<&User>, uri: &str) -> Response<Full<Bytes>> {
        let mut request = Request::builder().method(Method::GET).uri(uri);
        if let Some(user) = user {
            request = request.header(COOKIE, self.cookies(user, ""));
        }
        handle(&self.state, request.body(Full::new(Bytes::new())).unwrap()).await
    }

    async fn post(&self, user: &User, uri: &str, body: &str) -> Response<Full<Bytes>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(COOKIE, self.cookies(user, ""))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body.to_owned())))
            .unwrap();
        handle(&self.state, request).await
    }
}

async fn json(response: Response<Full<Bytes>>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn set_cookies(response: &Response<Full<Bytes>>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn anonymous_requests_are_rejected() {
    let server = Server::new();
    let response = server
        .get(None, &format!("/sign_up_sheet/list?id={}", server.assignment.id))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // the csrf token is handed out anyway
    assert!(set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("__Host_csrf_token=")));
}

#[tokio::test]
async fn unknown_actions_and_wrong_methods_are_refused() {
    let server = Server::new();
    let alice = server.student("alice");
    let response = server.get(Some(&alice), "/sign_up_sheet/teleport").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server.get(Some(&alice), "/sign_up_sheet/sign_up?id=1&topic_id=1").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn posts_without_the_csrf_token_are_rejected() {
    let server = Server::new();
    let topic = server.topic("Refactor the mailer", 1).await;
    let alice = server.student("alice");
    let response = server
        .post(
            &alice,
            "/sign_up_sheet/sign_up",
            &format!("id={}&topic_id={}&csrf_token=wrong", server.assignment.id, topic.id),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.repo.signups_for_topic(topic.id).unwrap().is_empty());
}

#[tokio::test]
async fn json_bodies_are_not_accepted() {
    let server = Server::new();
    let alice = server.student("alice");
    let request = Request::builder()
        .method(Method::POST)
        .uri("/sign_up_sheet/sign_up")
        .header(COOKIE, server.cookies(&alice, ""))
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();
    let response = handle(&server.state, request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn sign_up_redirects_and_the_flash_reaches_the_next_page() {
    let server = Server::new();
    let topic = server.topic("Refactor the mailer", 1).await;
    let alice = server.student("alice");
    let bob = server.student("bob");
    let body = format!(
        "id={}&topic_id={}&csrf_token={CSRF}",
        server.assignment.id, topic.id
    );

    let response = server.post(&alice, "/sign_up_sheet/sign_up", &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[LOCATION],
        format!("/sign_up_sheet/list?id={}", server.assignment.id)
    );
    assert!(set_cookies(&response).is_empty());

    let response = server.post(&bob, "/sign_up_sheet/sign_up", &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let flash = set_cookies(&response)
        .into_iter()
        .find(|cookie| cookie.starts_with("__Host_flash="))
        .unwrap();
    let flash = flash
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("__Host_flash=")
        .to_owned();

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/sign_up_sheet/list?id={}", server.assignment.id))
        .header(COOKIE, server.cookies(&bob, &format!("; __Host_flash={flash}")))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(&server.state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    // shown once, then cleared
    assert!(set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("__Host_flash=;")));
    let page = json(response).await;
    assert_eq!(page["view"], "list");
    assert_eq!(page["flash"]["kind"], "notice");
    assert_eq!(page["data"]["topics"][0]["waitlisted"], 1);
}

#[tokio::test]
async fn staff_pages_are_closed_to_students() {
    let server = Server::new();
    let alice = server.student("alice");
    let uri = format!("/sign_up_sheet/new?id={}", server.assignment.id);

    let response = server.get(Some(&alice), &uri).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let instructor = server.instructor.clone();
    let response = server.get(Some(&instructor), &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["view"], "new");
}

#[tokio::test]
async fn topic_form_is_posted_with_its_fields() {
    let server = Server::new();
    let instructor = server.instructor.clone();
    let response = server
        .post(
            &instructor,
            "/sign_up_sheet/create",
            &format!(
                "id={}&topic_id=&topic_identifier=E2&topic_name=Speed+up+search&max_choosers=2&\
                 micropayment=&csrf_token={CSRF}",
                server.assignment.id
            ),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[LOCATION],
        format!("/assignments/{}/edit", server.assignment.id)
    );
    let topics = server
        .repo
        .topics_for_assignment(server.assignment.id)
        .await
        .unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].topic_name, "Speed up search");
}

#[tokio::test]
async fn missing_assignment_is_a_not_found_page() {
    let server = Server::new();
    let alice = server.student("alice");
    let response = server.get(Some(&alice), "/sign_up_sheet/list?id=999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["error"], "assignment 999 does not exist");
}

#[tokio::test]
async fn memory_database_starts_with_demo_users() {
    let config = Config {
        listen_address: "127.0.0.1:0".parse().unwrap(),
        database_url: MEMORY_DATABASE.to_owned(),
        session_secret: String::from_utf8(SECRET.to_vec()).unwrap(),
        log_filter: "info".to_owned(),
    };
    let state = AppState::from_config(&config).await.unwrap();
    let alice = state
        .repo()
        .user_try_load_by_name("alice")
        .await
        .unwrap()
        .unwrap();

    // a known user gets past authentication and finds the assignment missing
    let request = Request::builder()
        .method(Method::GET)
        .uri("/sign_up_sheet/list?id=999")
        .header(COOKIE, user_cookie(state.key(), alice.id).stripped().to_string())
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(&state, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
