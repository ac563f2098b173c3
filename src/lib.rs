use async_trait::async_trait;
use std::sync::Arc;

pub mod common;
pub mod config;
pub mod error;
pub mod login;
pub mod plugins;
pub mod revolt;

pub use config::Conf;
pub use error::{BotError, Result};
use plugins::welcome::text::Typeface;

// boundary shape of a user, independent of the transport's own user struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub has_avatar: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(IncomingMessage),
    MemberJoined { server: String, user: String },
    MemberLeft { server: String, user: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outgoing {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }
    pub fn attach(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            bytes,
        });
        self
    }
}

/// Which server system channel a membership notice goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemChannel {
    UserJoined,
    UserLeft,
}

#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    /// Raw avatar bytes, empty when the user has no avatar.
    async fn fetch_avatar(&self, user: &str, high_res: bool) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, channel: &str, message: Outgoing) -> Result<()>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn profile(&self, user: &str) -> Result<Profile>;
    async fn system_channel(&self, server: &str, kind: SystemChannel) -> Result<Option<String>>;
}

pub trait Chat: AvatarFetcher + MessageSender + Directory {}
impl<T: AvatarFetcher + MessageSender + Directory> Chat for T {}

/// Everything a handler needs, built once by `main` after the session is up.
#[derive(Clone)]
pub struct Context {
    pub chat: Arc<dyn Chat>,
    pub conf: Arc<Conf>,
    /// Id of the logged in account, used to pick out outgoing messages.
    pub self_id: String,
    /// Caption font, the bundled face unless `welcome.font` overrides it.
    pub typeface: Arc<Typeface>,
}

impl Context {
    pub fn new(chat: Arc<dyn Chat>, conf: Conf, self_id: impl Into<String>) -> Self {
        Self {
            chat,
            conf: Arc::new(conf),
            self_id: self_id.into(),
            typeface: Arc::new(Typeface::bundled()),
        }
    }

    pub fn with_typeface(mut self, typeface: Typeface) -> Self {
        self.typeface = Arc::new(typeface);
        self
    }

    /// Runs every plugin against one event. Handler errors are logged and dropped.
    pub async fn dispatch(&self, event: Event) {
        let (spam, welcome, membership) = tokio::join!(
            plugins::spam::on_event(self, &event),
            plugins::welcome::on_event(self, &event),
            plugins::membership::on_event(self, &event),
        );

        for (plugin, result) in [("spam", spam), ("welcome", welcome), ("membership", membership)]
        {
            if let Err(e) = result {
                tracing::warn!(plugin, "handler failed: {e}");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// In-memory chat that records sends in order.
    #[derive(Default)]
    pub struct FakeChat {
        pub profiles: Vec<Profile>,
        pub avatars: Vec<(String, Vec<u8>)>,
        pub joined_channel: Option<String>,
        pub left_channel: Option<String>,
        pub sent: Mutex<Vec<(String, Outgoing)>>,
        pub avatar_requests: Mutex<Vec<(String, bool)>>,
    }

    impl FakeChat {
        pub fn with_user(mut self, id: &str, name: &str, avatar: Option<Vec<u8>>) -> Self {
            self.profiles.push(Profile {
                id: id.into(),
                display_name: name.into(),
                has_avatar: avatar.is_some(),
            });
            self.avatars.push((id.into(), avatar.unwrap_or_default()));
            self
        }

        pub async fn sent(&self) -> Vec<(String, Outgoing)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl AvatarFetcher for FakeChat {
        async fn fetch_avatar(&self, user: &str, high_res: bool) -> Result<Vec<u8>> {
            self.avatar_requests
                .lock()
                .await
                .push((user.to_string(), high_res));
            self.avatars
                .iter()
                .find(|(id, _)| id == user)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| BotError::Transport(format!("unknown user {user}")))
        }
    }

    #[async_trait]
    impl MessageSender for FakeChat {
        async fn send(&self, channel: &str, message: Outgoing) -> Result<()> {
            self.sent.lock().await.push((channel.to_string(), message));
            Ok(())
        }
    }

    #[async_trait]
    impl Directory for FakeChat {
        async fn profile(&self, user: &str) -> Result<Profile> {
            self.profiles
                .iter()
                .find(|profile| profile.id == user)
                .cloned()
                .ok_or_else(|| BotError::Transport(format!("unknown user {user}")))
        }

        async fn system_channel(&self, _server: &str, kind: SystemChannel) -> Result<Option<String>> {
            Ok(match kind {
                SystemChannel::UserJoined => self.joined_channel.clone(),
                SystemChannel::UserLeft => self.left_channel.clone(),
            })
        }
    }

    pub const SELF_ID: &str = "01SELF";

    pub fn context(chat: Arc<FakeChat>) -> Context {
        Context::new(chat, Conf::default(), SELF_ID)
    }

    pub fn outgoing(content: &str) -> Event {
        Event::Message(IncomingMessage {
            id: "01MSG".into(),
            channel: "01CHAN".into(),
            author: SELF_ID.into(),
            content: content.into(),
        })
    }

    pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }
}
