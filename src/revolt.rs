//! Revolt implementation of the chat collaborators.
//!
//! Events and plain text go through reywen; user lookups, Autumn downloads
//! and uploads, attachment messages and logins use the REST API directly.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{multipart, RequestBuilder};
use reywen::{
    client::Client,
    structures::channels::message::DataMessageSend,
    websocket::data::WebSocketEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::AuthConf,
    error::{BotError, Result},
    login::{LoginRequest, LoginResponse, SessionApi},
    Attachment, AvatarFetcher, Context, Directory, Event, IncomingMessage, MessageSender,
    Outgoing, Profile, SystemChannel,
};

const TOKEN_HEADER: &str = "x-session-token";
const LOW_RES_SIDE: u32 = 256;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct File {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<File>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            display_name: user.display_name.unwrap_or(user.username),
            has_avatar: user.avatar.is_some(),
            id: user.id,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemMessages {
    pub user_joined: Option<String>,
    pub user_left: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Server {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub system_messages: Option<SystemMessages>,
}

impl Server {
    pub fn channel(&self, kind: SystemChannel) -> Option<String> {
        let messages = self.system_messages.as_ref()?;
        match kind {
            SystemChannel::UserJoined => messages.user_joined.clone(),
            SystemChannel::UserLeft => messages.user_left.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct Uploaded {
    id: String,
}

#[derive(Serialize, Debug)]
struct MessagePayload<'a> {
    content: &'a str,
    attachments: Vec<String>,
}

pub fn avatar_url(autumn: &str, file: &File, high_res: bool) -> String {
    let url = format!("{autumn}/avatars/{}", urlencoding::encode(&file.id));
    if high_res {
        url
    } else {
        format!("{url}?max_side={LOW_RES_SIDE}")
    }
}

/// REST half of the transport.
#[derive(Debug, Clone)]
pub struct Http {
    client: reqwest::Client,
    api: String,
    autumn: String,
    token: Option<String>,
}

impl Http {
    pub fn new(conf: &AuthConf) -> Self {
        Self {
            client: reqwest::Client::new(),
            api: conf.api.trim_end_matches('/').to_string(),
            autumn: conf.autumn.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(%url, "GET");
        Ok(self
            .authed(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?)
    }

    pub async fn me(&self) -> Result<User> {
        self.get_json(format!("{}/users/@me", self.api)).await
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        self.get_json(format!("{}/users/{}", self.api, urlencoding::encode(id)))
            .await
    }

    pub async fn server(&self, id: &str) -> Result<Server> {
        self.get_json(format!("{}/servers/{}", self.api, urlencoding::encode(id)))
            .await
    }

    pub async fn avatar(&self, file: &File, high_res: bool) -> Result<Vec<u8>> {
        let url = avatar_url(&self.autumn, file, high_res);
        debug!(%url, "GET");
        let bytes = self
            .authed(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    pub async fn upload(&self, attachment: Attachment) -> Result<String> {
        let part = multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.filename)
            .mime_str("image/png")?;
        let form = multipart::Form::new().part("file", part);

        let uploaded: Uploaded = self
            .authed(self.client.post(format!("{}/attachments", self.autumn)))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(uploaded.id)
    }

    pub async fn post_message(&self, channel: &str, content: &str, attachments: Vec<String>) -> Result<()> {
        let url = format!(
            "{}/channels/{}/messages",
            self.api,
            urlencoding::encode(channel)
        );
        self.authed(self.client.post(url))
            .header("Idempotency-Key", format!("{:016x}", rand::random::<u64>()))
            .json(&MessagePayload {
                content,
                attachments,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl SessionApi for Http {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        Ok(self
            .client
            .post(format!("{}/auth/session/login", self.api))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Logged in Revolt account.
pub struct Revolt {
    pub http: Http,
    client: Client,
}

impl Revolt {
    pub fn connect(conf: &AuthConf, token: &str) -> Result<Self> {
        let client =
            Client::from_token(token, false).map_err(|e| BotError::Transport(format!("{e:?}")))?;
        Ok(Self {
            http: Http::new(conf).with_token(token),
            client,
        })
    }

    /// Feeds websocket events to `ctx`, one task per event, until the socket closes.
    pub async fn listen(&self, ctx: Context) {
        let (read, _write) = self.client.websocket.clone().dual_async().await;
        info!("websocket established");

        futures_util::pin_mut!(read);
        while let Some(event) = read.next().await {
            let event = from_websocket(event);
            if event == Event::Other {
                continue;
            }
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.dispatch(event).await });
        }
        info!("websocket closed");
    }
}

fn from_websocket(event: WebSocketEvent) -> Event {
    match event {
        WebSocketEvent::Message { message, .. } => Event::Message(IncomingMessage {
            id: message.id,
            channel: message.channel,
            author: message.author,
            content: message.content.unwrap_or_default(),
        }),
        WebSocketEvent::ServerMemberJoin { server_id, user_id } => Event::MemberJoined {
            server: server_id,
            user: user_id,
        },
        WebSocketEvent::ServerMemberLeave { server_id, user_id } => Event::MemberLeft {
            server: server_id,
            user: user_id,
        },
        _ => Event::Other,
    }
}

#[async_trait]
impl AvatarFetcher for Revolt {
    async fn fetch_avatar(&self, user: &str, high_res: bool) -> Result<Vec<u8>> {
        match self.http.user(user).await?.avatar {
            Some(file) => self.http.avatar(&file, high_res).await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageSender for Revolt {
    async fn send(&self, channel: &str, message: Outgoing) -> Result<()> {
        match message.attachment {
            Some(attachment) => {
                let id = self.http.upload(attachment).await?;
                self.http.post_message(channel, &message.text, vec![id]).await
            }
            None => {
                self.client
                    .message_send(channel, &DataMessageSend::new().set_content(&message.text))
                    .await
                    .map_err(|e| BotError::Transport(format!("{e:?}")))?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Directory for Revolt {
    async fn profile(&self, user: &str) -> Result<Profile> {
        Ok(self.http.user(user).await?.into())
    }

    async fn system_channel(&self, server: &str, kind: SystemChannel) -> Result<Option<String>> {
        Ok(self.http.server(server).await?.channel(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_to_profile() {
        let user: User = serde_json::from_str(
            r#"{"_id":"01ADA","username":"ada","display_name":"Ada","avatar":{"_id":"F1","tag":"avatars"}}"#,
        )
        .unwrap();
        assert_eq!(
            Profile::from(user),
            Profile {
                id: "01ADA".into(),
                display_name: "Ada".into(),
                has_avatar: true
            }
        );

        let user: User = serde_json::from_str(r#"{"_id":"01BOB","username":"bob"}"#).unwrap();
        let profile = Profile::from(user);
        assert_eq!(profile.display_name, "bob");
        assert!(!profile.has_avatar);
    }

    #[test]
    fn server_system_channels() {
        let server: Server = serde_json::from_str(
            r#"{"_id":"S","name":"x","system_messages":{"user_joined":"C1"}}"#,
        )
        .unwrap();
        assert_eq!(server.channel(SystemChannel::UserJoined).as_deref(), Some("C1"));
        assert_eq!(server.channel(SystemChannel::UserLeft), None);

        let bare: Server = serde_json::from_str(r#"{"_id":"S"}"#).unwrap();
        assert_eq!(bare.channel(SystemChannel::UserJoined), None);
    }

    fn event(json: &str) -> Event {
        from_websocket(serde_json::from_str::<WebSocketEvent>(json).unwrap())
    }

    #[test]
    fn membership_events_map_ids() {
        assert_eq!(
            event(r#"{"type":"ServerMemberJoin","id":"S","user":"U"}"#),
            Event::MemberJoined {
                server: "S".into(),
                user: "U".into()
            }
        );
        assert_eq!(
            event(r#"{"type":"ServerMemberLeave","id":"S","user":"U"}"#),
            Event::MemberLeft {
                server: "S".into(),
                user: "U".into()
            }
        );
    }

    #[test]
    fn message_events_keep_author_and_content() {
        let got = event(r#"{"type":"Message","_id":"M1","channel":"C1","author":"A1","content":"-spam 2 hi"}"#);
        assert_eq!(
            got,
            Event::Message(IncomingMessage {
                id: "M1".into(),
                channel: "C1".into(),
                author: "A1".into(),
                content: "-spam 2 hi".into(),
            })
        );
        assert_eq!(event(r#"{"type":"ServerDelete","id":"S"}"#), Event::Other);
    }

    #[test]
    fn avatar_urls() {
        let file = File { id: "F1".into() };
        assert_eq!(
            avatar_url("https://autumn.revolt.chat", &file, true),
            "https://autumn.revolt.chat/avatars/F1"
        );
        assert_eq!(
            avatar_url("https://autumn.revolt.chat", &file, false),
            "https://autumn.revolt.chat/avatars/F1?max_side=256"
        );
    }

    #[test]
    fn trims_trailing_slashes() {
        let conf = AuthConf {
            api: "https://api.example/".into(),
            ..Default::default()
        };
        let http = Http::new(&conf);
        assert_eq!(http.api, "https://api.example");
        assert!(http.token.is_none());
        assert_eq!(http.with_token("T").token.as_deref(), Some("T"));
    }
}
