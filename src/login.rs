//! Interactive session creation for accounts without a stored token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin},
    sync::Mutex,
};
use tracing::info;

use crate::error::{BotError, Result};

/// Source of login secrets, asked only for what the server needs.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn identifier(&self) -> Result<String>;
    async fn password(&self) -> Result<String>;
    async fn verification_code(&self) -> Result<String>;
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MfaResponse {
    pub totp_code: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LoginRequest {
    Password {
        email: String,
        password: String,
        friendly_name: String,
    },
    Mfa {
        mfa_ticket: String,
        mfa_response: MfaResponse,
        friendly_name: String,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "result")]
pub enum LoginResponse {
    Success {
        token: String,
        user_id: String,
    },
    #[serde(rename = "MFA")]
    Mfa {
        ticket: String,
        #[serde(default)]
        allowed_methods: Vec<String>,
    },
    Disabled {
        user_id: String,
    },
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

pub async fn login<A, C>(api: &A, credentials: &C, friendly_name: &str) -> Result<Session>
where
    A: SessionApi + ?Sized,
    C: CredentialProvider + ?Sized,
{
    let request = LoginRequest::Password {
        email: credentials.identifier().await?,
        password: credentials.password().await?,
        friendly_name: friendly_name.to_string(),
    };

    let ticket = match api.login(&request).await? {
        LoginResponse::Success { token, user_id } => return Ok(Session { token, user_id }),
        LoginResponse::Disabled { user_id } => {
            return Err(BotError::Login(format!("account {user_id} is disabled")))
        }
        LoginResponse::Mfa {
            ticket,
            allowed_methods,
        } => {
            if !allowed_methods.is_empty() && !allowed_methods.iter().any(|m| m == "Totp") {
                return Err(BotError::Login(format!(
                    "no supported second factor in {allowed_methods:?}"
                )));
            }
            ticket
        }
    };

    info!("second factor required");
    let request = LoginRequest::Mfa {
        mfa_ticket: ticket,
        mfa_response: MfaResponse {
            totp_code: credentials.verification_code().await?,
        },
        friendly_name: friendly_name.to_string(),
    };

    match api.login(&request).await? {
        LoginResponse::Success { token, user_id } => Ok(Session { token, user_id }),
        LoginResponse::Disabled { user_id } => {
            Err(BotError::Login(format!("account {user_id} is disabled")))
        }
        LoginResponse::Mfa { .. } => Err(BotError::Login(String::from(
            "second factor was not accepted",
        ))),
    }
}

/// Asks the operator on the terminal.
pub struct StdinCredentials {
    input: Mutex<BufReader<Stdin>>,
}

impl Default for StdinCredentials {
    fn default() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl StdinCredentials {
    async fn prompt(&self, question: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        if self.input.lock().await.read_line(&mut line).await? == 0 {
            return Err(BotError::Login(String::from("stdin closed")));
        }
        Ok(line.trim().to_string())
    }
}

#[async_trait]
impl CredentialProvider for StdinCredentials {
    async fn identifier(&self) -> Result<String> {
        self.prompt("Please enter your email: ").await
    }
    async fn password(&self) -> Result<String> {
        self.prompt("Please enter your password: ").await
    }
    async fn verification_code(&self) -> Result<String> {
        self.prompt("Please enter the code from your authenticator: ").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        responses: Mutex<VecDeque<LoginResponse>>,
        requests: Mutex<Vec<LoginRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<LoginResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SessionApi for Scripted {
        async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
            self.requests.lock().await.push(request.clone());
            self.responses
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| BotError::Login(String::from("unexpected request")))
        }
    }

    struct Fixed;

    #[async_trait]
    impl CredentialProvider for Fixed {
        async fn identifier(&self) -> Result<String> {
            Ok("ada@example.com".into())
        }
        async fn password(&self) -> Result<String> {
            Ok("hunter2".into())
        }
        async fn verification_code(&self) -> Result<String> {
            Ok("123456".into())
        }
    }

    fn success() -> LoginResponse {
        LoginResponse::Success {
            token: "TOKEN".into(),
            user_id: "01ADA".into(),
        }
    }

    #[tokio::test]
    async fn password_only() {
        let api = Scripted::new(vec![success()]);
        let session = login(&api, &Fixed, "bot").await.unwrap();

        assert_eq!(session.token, "TOKEN");
        assert_eq!(session.user_id, "01ADA");
        assert_eq!(
            api.requests.lock().await.as_slice(),
            &[LoginRequest::Password {
                email: "ada@example.com".into(),
                password: "hunter2".into(),
                friendly_name: "bot".into(),
            }]
        );
    }

    #[tokio::test]
    async fn with_second_factor() {
        let api = Scripted::new(vec![
            LoginResponse::Mfa {
                ticket: "T1".into(),
                allowed_methods: vec!["Totp".into(), "Recovery".into()],
            },
            success(),
        ]);
        let session = login(&api, &Fixed, "bot").await.unwrap();

        assert_eq!(session.token, "TOKEN");
        let requests = api.requests.lock().await;
        assert_eq!(
            requests[1],
            LoginRequest::Mfa {
                mfa_ticket: "T1".into(),
                mfa_response: MfaResponse {
                    totp_code: "123456".into()
                },
                friendly_name: "bot".into(),
            }
        );
    }

    #[tokio::test]
    async fn disabled_and_rejected() {
        let api = Scripted::new(vec![LoginResponse::Disabled {
            user_id: "01ADA".into(),
        }]);
        assert!(matches!(login(&api, &Fixed, "bot").await, Err(BotError::Login(_))));

        let api = Scripted::new(vec![
            LoginResponse::Mfa {
                ticket: "T1".into(),
                allowed_methods: vec![],
            },
            LoginResponse::Mfa {
                ticket: "T2".into(),
                allowed_methods: vec![],
            },
        ]);
        assert!(matches!(login(&api, &Fixed, "bot").await, Err(BotError::Login(_))));

        let api = Scripted::new(vec![LoginResponse::Mfa {
            ticket: "T1".into(),
            allowed_methods: vec!["Recovery".into()],
        }]);
        assert!(matches!(login(&api, &Fixed, "bot").await, Err(BotError::Login(_))));
    }

    #[test]
    fn wire_shapes() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"result":"Success","_id":"S","user_id":"U","token":"T","name":"bot"}"#,
        )
        .unwrap();
        assert_eq!(
            response,
            LoginResponse::Success {
                token: "T".into(),
                user_id: "U".into()
            }
        );

        let response: LoginResponse =
            serde_json::from_str(r#"{"result":"MFA","ticket":"X","allowed_methods":["Totp"]}"#)
                .unwrap();
        assert!(matches!(response, LoginResponse::Mfa { .. }));

        let body = serde_json::to_value(LoginRequest::Mfa {
            mfa_ticket: "X".into(),
            mfa_response: MfaResponse {
                totp_code: "1".into(),
            },
            friendly_name: "bot".into(),
        })
        .unwrap();
        assert_eq!(body["mfa_response"]["totp_code"], "1");
        assert_eq!(body["mfa_ticket"], "X");
    }
}
