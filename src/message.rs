//! Inbound callback messages and passive replies
//!
//! A callback body is decoded by reading its `MsgType` discriminant first and
//! then handing the fields to the parser for that kind. Events are dispatched
//! a second time on their `Event` field.

use crate::error::WechatError;
use crate::fields::{self, cdata, Fields};

/// Fields shared by every message and event
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// Developer account (`ToUserName`)
    pub to_user_name: String,
    /// Sender OpenID (`FromUserName`)
    pub from_user_name: String,
    /// Unix seconds (`CreateTime`)
    pub create_time: i64,
    /// 64-bit message id, absent on events
    pub msg_id: Option<i64>,
}

/// Decoded callback message
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub header: MessageHeader,
    pub body: MessageBody,
}

/// Message payload by `MsgType`
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        pic_url: String,
        media_id: String,
    },
    Voice {
        media_id: String,
        format: String,
        /// Speech recognition result, when enabled
        recognition: Option<String>,
    },
    Video {
        media_id: String,
        thumb_media_id: String,
    },
    ShortVideo {
        media_id: String,
        thumb_media_id: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
        scale: i32,
        label: String,
    },
    Link {
        title: String,
        description: String,
        url: String,
    },
    Event(Event),
}

/// Event payload by `Event`
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Follow; carries a scene key and ticket when triggered by a QR code
    Subscribe {
        event_key: Option<String>,
        ticket: Option<String>,
    },
    Unsubscribe,
    /// QR code scanned by an existing follower
    Scan {
        event_key: String,
        ticket: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
        precision: f64,
    },
    Click {
        event_key: String,
    },
    View {
        url: String,
    },
    TemplateSendJobFinish {
        msg_id: i64,
        status: String,
    },
    /// Event kinds without a dedicated parser
    Other {
        event: String,
    },
}

/// Outcome of a template message delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSendStatus {
    Success,
    UserBlock,
    SystemFailed,
    Unknown,
}

impl TemplateSendStatus {
    pub fn from_status(status: &str) -> Self {
        if status == "success" {
            TemplateSendStatus::Success
        } else if status.contains("user") {
            TemplateSendStatus::UserBlock
        } else if status.contains("system") {
            TemplateSendStatus::SystemFailed
        } else {
            TemplateSendStatus::Unknown
        }
    }
}

impl InboundMessage {
    /// Decode a plaintext callback body.
    pub fn parse(xml: &[u8]) -> Result<Self, WechatError> {
        let fields = fields::read_fields(xml)?;
        let msg_type = fields.required("MsgType")?.to_string();

        let body = match msg_type.as_str() {
            "text" => MessageBody::Text {
                content: fields.string("Content"),
            },
            "image" => MessageBody::Image {
                pic_url: fields.string("PicUrl"),
                media_id: fields.string("MediaId"),
            },
            "voice" => MessageBody::Voice {
                media_id: fields.string("MediaId"),
                format: fields.string("Format"),
                recognition: fields.opt_string("Recognition"),
            },
            "video" => MessageBody::Video {
                media_id: fields.string("MediaId"),
                thumb_media_id: fields.string("ThumbMediaId"),
            },
            "shortvideo" => MessageBody::ShortVideo {
                media_id: fields.string("MediaId"),
                thumb_media_id: fields.string("ThumbMediaId"),
            },
            "location" => MessageBody::Location {
                latitude: fields.parse_or_default("Location_X")?,
                longitude: fields.parse_or_default("Location_Y")?,
                scale: fields.parse_or_default("Scale")?,
                label: fields.string("Label"),
            },
            "link" => MessageBody::Link {
                title: fields.string("Title"),
                description: fields.string("Description"),
                url: fields.string("Url"),
            },
            "event" => MessageBody::Event(parse_event(&fields)?),
            _ => return Err(WechatError::UnknownMessageType(msg_type)),
        };

        Ok(Self {
            header: parse_header(&fields)?,
            body,
        })
    }

    pub fn msg_type(&self) -> &'static str {
        match self.body {
            MessageBody::Text { .. } => "text",
            MessageBody::Image { .. } => "image",
            MessageBody::Voice { .. } => "voice",
            MessageBody::Video { .. } => "video",
            MessageBody::ShortVideo { .. } => "shortvideo",
            MessageBody::Location { .. } => "location",
            MessageBody::Link { .. } => "link",
            MessageBody::Event(_) => "event",
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self.body, MessageBody::Event(_))
    }
}

fn parse_header(fields: &Fields) -> Result<MessageHeader, WechatError> {
    Ok(MessageHeader {
        to_user_name: fields.string("ToUserName"),
        from_user_name: fields.string("FromUserName"),
        create_time: fields.parse_or_default("CreateTime")?,
        msg_id: fields.parse("MsgId")?,
    })
}

fn parse_event(fields: &Fields) -> Result<Event, WechatError> {
    let event = fields.string("Event");

    let parsed = match event.as_str() {
        "subscribe" => Event::Subscribe {
            event_key: fields.opt_string("EventKey"),
            ticket: fields.opt_string("Ticket"),
        },
        "unsubscribe" => Event::Unsubscribe,
        "SCAN" => Event::Scan {
            event_key: fields.string("EventKey"),
            ticket: fields.string("Ticket"),
        },
        "LOCATION" => Event::Location {
            latitude: fields.parse_or_default("Latitude")?,
            longitude: fields.parse_or_default("Longitude")?,
            precision: fields.parse_or_default("Precision")?,
        },
        "CLICK" => Event::Click {
            event_key: fields.string("EventKey"),
        },
        "VIEW" => Event::View {
            url: fields.string("EventKey"),
        },
        "TEMPLATESENDJOBFINISH" => Event::TemplateSendJobFinish {
            msg_id: fields.parse_or_default("MsgID")?,
            status: fields.string("Status"),
        },
        _ => Event::Other { event },
    };

    Ok(parsed)
}

/// Passive reply to a callback message
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text {
        to_user_name: String,
        from_user_name: String,
        content: String,
    },
    /// Hand the conversation over to customer service
    TransferCustomerService {
        to_user_name: String,
        from_user_name: String,
    },
}

impl Reply {
    /// Text reply addressed back to the sender of `message`.
    pub fn text(message: &InboundMessage, content: impl Into<String>) -> Self {
        Reply::Text {
            to_user_name: message.header.from_user_name.clone(),
            from_user_name: message.header.to_user_name.clone(),
            content: content.into(),
        }
    }

    /// Customer service transfer for `message`; events cannot be transferred.
    pub fn transfer_customer_service(message: &InboundMessage) -> Result<Self, WechatError> {
        if message.is_event() {
            return Err(WechatError::UnknownMessageType(
                "events cannot be transferred to customer service".to_string(),
            ));
        }
        Ok(Reply::TransferCustomerService {
            to_user_name: message.header.from_user_name.clone(),
            from_user_name: message.header.to_user_name.clone(),
        })
    }

    /// Render the reply XML stamped with `create_time`.
    pub fn to_xml(&self, create_time: i64) -> String {
        match self {
            Reply::Text {
                to_user_name,
                from_user_name,
                content,
            } => format!(
                "<xml><ToUserName>{}</ToUserName><FromUserName>{}</FromUserName><CreateTime>{}</CreateTime><MsgType>{}</MsgType><Content>{}</Content></xml>",
                cdata(to_user_name),
                cdata(from_user_name),
                create_time,
                cdata("text"),
                cdata(content),
            ),
            Reply::TransferCustomerService {
                to_user_name,
                from_user_name,
            } => format!(
                "<xml><ToUserName>{}</ToUserName><FromUserName>{}</FromUserName><CreateTime>{}</CreateTime><MsgType>{}</MsgType></xml>",
                cdata(to_user_name),
                cdata(from_user_name),
                create_time,
                cdata("transfer_customer_service"),
            ),
        }
    }
}
