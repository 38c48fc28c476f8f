#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use sessionward::configuration::{
    ApplicationSettings, CookieSettings, DatabaseSettings, EmailClientSettings, HashingSettings,
    Settings, TokenSettings,
};
use sessionward::email_client::Mailer;
use sessionward::error::EmailError;
use sessionward::startup::{run, AppState};
use sessionward::store::MemoryStore;

pub const PASSWORD: &str = "correct horse battery";

#[derive(Debug, Clone, PartialEq)]
pub enum Mail {
    Verification { to: String, token: String },
    PasswordReset { to: String, token: String },
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Mail>>,
}

impl RecordingMailer {
    pub async fn verification_token(&self, email: &str) -> Option<String> {
        self.sent.lock().await.iter().rev().find_map(|mail| match mail {
            Mail::Verification { to, token } if to == email => Some(token.clone()),
            _ => None,
        })
    }

    pub async fn reset_token(&self, email: &str) -> Option<String> {
        self.sent.lock().await.iter().rev().find_map(|mail| match mail {
            Mail::PasswordReset { to, token } if to == email => Some(token.clone()),
            _ => None,
        })
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification_email(&self, to: &str, token: &str) -> Result<(), EmailError> {
        self.sent.lock().await.push(Mail::Verification {
            to: to.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<(), EmailError> {
        self.sent.lock().await.push(Mail::PasswordReset {
            to: to.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub client: reqwest::Client,
}

/// Session cookies returned by a login or rotation
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub refresh_token: String,
    pub session_id: String,
}

impl SessionCookies {
    pub fn header(&self) -> String {
        format!("refTkn={}; sid={}", self.refresh_token, self.session_id)
    }
}

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "unused".to_string(),
            password: "unused".to_string(),
            port: 5432,
            host: "127.0.0.1".to_string(),
            database_name: "unused".to_string(),
            acquire_timeout_secs: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            client_url: "http://localhost:3000".to_string(),
        },
        tokens: TokenSettings {
            issuer: "sessionward-test".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604800,
            remember_me_multiplier: 30,
            single_use_ttl_secs: 86400,
            private_key_pem: Some(include_str!("../fixtures/signing_private.pem").to_string()),
            private_key_path: None,
            public_key_pem: Some(include_str!("../fixtures/signing_public.pem").to_string()),
            public_key_path: None,
        },
        hashing: HashingSettings { cost: 4 },
        email_client: EmailClientSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            sender_email: "noreply@example.com".to_string(),
            timeout_millis: 200,
        },
        cookies: CookieSettings { secure: true },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customize: impl FnOnce(&mut Settings)) -> TestApp {
    let mut settings = test_settings();
    customize(&mut settings);
    settings.validate().expect("Invalid test settings");

    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::build(&settings, store.clone(), store.clone(), mailer.clone())
        .expect("Failed to build application state");

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        mailer,
        client: reqwest::Client::new(),
    }
}

/// Parse every `Set-Cookie` header into name -> full attribute string
pub fn set_cookies(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| {
            let (name, _) = raw.split_once('=')?;
            Some((name.to_string(), raw.to_string()))
        })
        .collect()
}

pub fn cookie_value(raw: &str) -> String {
    raw.split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, username: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD,
                "firstName": "Test",
                "lastName": "User"
            }),
        )
        .await
    }

    /// Register and confirm the email through the recorded verification link
    pub async fn register_verified(&self, username: &str) {
        assert_eq!(201, self.register(username).await.status().as_u16());
        let email = format!("{}@example.com", username);
        let token = self
            .mailer
            .verification_token(&email)
            .await
            .expect("No verification email recorded");
        let response = self
            .post_json("/auth/email/verify", &json!({ "token": token }))
            .await;
        assert_eq!(200, response.status().as_u16());
    }

    pub async fn login_raw(&self, username: &str, password: &str, remember_me: bool) -> reqwest::Response {
        self.post_json(
            "/auth/login",
            &json!({
                "email": format!("{}@example.com", username),
                "password": password,
                "rememberMe": remember_me
            }),
        )
        .await
    }

    /// Log in and return (access token, session cookies)
    pub async fn login(&self, username: &str) -> (String, SessionCookies) {
        let response = self.login_raw(username, PASSWORD, false).await;
        assert_eq!(200, response.status().as_u16());
        let cookies = set_cookies(&response);
        let body: Value = response.json().await.unwrap();

        let session = SessionCookies {
            refresh_token: cookie_value(&cookies["refTkn"]),
            session_id: cookie_value(&cookies["sid"]),
        };
        let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();
        (access_token, session)
    }

    pub async fn refresh(&self, cookies: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/refresh"))
            .header(reqwest::header::COOKIE, cookies)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_with_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn user_id(&self, username: &str) -> uuid::Uuid {
        use sessionward::store::UserStore;
        self.store
            .find_by_email(&format!("{}@example.com", username))
            .await
            .unwrap()
            .expect("user not found")
            .id
    }
}

pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse response");
    body["code"].as_str().unwrap_or_default().to_string()
}
