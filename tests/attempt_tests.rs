// tests/attempt_tests.rs

use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use examhall::bank::SqliteQuestionBank;
use examhall::config::Config;
use examhall::routes;
use examhall::session::SessionRegistry;
use examhall::state::AppState;
use examhall::storage::{AttemptStore, SqliteAttemptStore};
use examhall::utils::jwt::sign_jwt;

const TEST_SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    pool: SqlitePool,
}

async fn spawn_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        rust_log: "error".to_string(),
    };

    let store: Arc<dyn AttemptStore> = Arc::new(SqliteAttemptStore::new(pool.clone()));
    let sessions = SessionRegistry::new(
        Arc::new(SqliteQuestionBank::new(pool.clone())),
        Arc::clone(&store),
    );

    let state = AppState {
        pool: pool.clone(),
        config,
        sessions,
        store,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, pool }
}

impl TestApp {
    fn token(&self, user_id: i64) -> String {
        sign_jwt(user_id, TEST_SECRET, 600).expect("Failed to sign test token")
    }

    async fn seed_test(&self) -> i64 {
        let questions = serde_json::json!([
            {
                "id": "q1",
                "text": "2 + 2 = ?",
                "options": [{"id": "A", "text": "4"}, {"id": "B", "text": "5"}],
                "correct_option": "A",
                "subject": "Mathematics",
                "topic": "Arithmetic"
            },
            {
                "id": "q2",
                "text": "The SI unit of force is?",
                "options": [{"id": "A", "text": "Joule"}, {"id": "B", "text": "Newton"}],
                "correct_option": "B",
                "subject": "Physics",
                "topic": "Mechanics"
            }
        ]);

        let result = sqlx::query(
            "INSERT INTO tests (title, description, duration_seconds, questions) VALUES (?, ?, ?, ?)",
        )
        .bind("Sample paper")
        .bind(Option::<String>::None)
        .bind(Option::<i64>::None)
        .bind(questions.to_string())
        .execute(&self.pool)
        .await
        .expect("Failed to seed test");

        result.last_insert_rowid()
    }

    /// Runs a full attempt (q1 correct, q2 unattempted) and returns the
    /// attempt id.
    async fn complete_attempt(&self, client: &reqwest::Client, test_id: i64, user_id: i64) -> String {
        let body: serde_json::Value = client
            .post(format!("{}/api/tests/{}/session", self.address, test_id))
            .bearer_auth(self.token(user_id))
            .json(&serde_json::json!({}))
            .send()
            .await
            .expect("Failed to start session")
            .json()
            .await
            .unwrap();
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let response = client
            .post(format!("{}/api/sessions/{}/submit", self.address, session_id))
            .bearer_auth(self.token(user_id))
            .json(&serde_json::json!({"answers": {"q1": "A"}}))
            .send()
            .await
            .expect("Failed to submit");
        assert_eq!(response.status().as_u16(), 200);

        session_id
    }
}

#[tokio::test]
async fn history_is_empty_before_any_attempt() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let history: serde_json::Value = client
        .get(format!("{}/api/attempts", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to fetch history")
        .json()
        .await
        .unwrap();

    assert_eq!(history, serde_json::json!([]));
}

#[tokio::test]
async fn completed_attempt_shows_up_in_history_and_detail() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let test_id = app.seed_test().await;
    let attempt_id = app.complete_attempt(&client, test_id, 1).await;

    let history: serde_json::Value = client
        .get(format!("{}/api/attempts", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to fetch history")
        .json()
        .await
        .unwrap();

    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["attempt_id"], attempt_id.as_str());
    assert_eq!(entries[0]["test_id"], test_id);
    assert_eq!(entries[0]["termination"], "submitted");
    assert_eq!(entries[0]["total_score"], 4);
    assert_eq!(entries[0]["max_score"], 8);

    let detail: serde_json::Value = client
        .get(format!("{}/api/attempts/{}", app.address, attempt_id))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to fetch attempt")
        .json()
        .await
        .unwrap();

    assert_eq!(detail["attempt_id"], attempt_id.as_str());
    assert_eq!(detail["report"]["total_score"], 4);
    assert_eq!(detail["report"]["percentage"], 50.0);
    assert_eq!(detail["report"]["questions"][0]["outcome"], "correct");
    assert_eq!(detail["report"]["subjects"]["Physics"]["unattempted"], 1);
}

#[tokio::test]
async fn attempts_are_scoped_to_their_owner() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let test_id = app.seed_test().await;
    let attempt_id = app.complete_attempt(&client, test_id, 1).await;

    let response = client
        .get(format!("{}/api/attempts/{}", app.address, attempt_id))
        .bearer_auth(app.token(2))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);

    let history: serde_json::Value = client
        .get(format!("{}/api/attempts", app.address))
        .bearer_auth(app.token(2))
        .send()
        .await
        .expect("Failed to fetch history")
        .json()
        .await
        .unwrap();
    assert_eq!(history, serde_json::json!([]));
}

#[tokio::test]
async fn unknown_attempt_is_not_found() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "{}/api/attempts/00000000-0000-0000-0000-000000000000",
            app.address
        ))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}
