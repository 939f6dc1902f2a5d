use wechat_secure_channel::channel::CallbackQuery;
use wechat_secure_channel::crypto::callback_signature;
use wechat_secure_channel::fields::read_fields;
use wechat_secure_channel::message::{Event, MessageBody};
use wechat_secure_channel::{CryptoChannel, InboundMessage, Reply, WechatError};

const ENCODING_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
const APPID: &str = "wxb11529c136998cb6";
const TOKEN: &str = "pamtest";

fn parse(xml: &str) -> InboundMessage {
    InboundMessage::parse(xml.as_bytes()).unwrap()
}

#[test]
fn test_all_message_kinds() {
    let header = "<ToUserName><![CDATA[gh_1]]></ToUserName><FromUserName><![CDATA[o_1]]></FromUserName><CreateTime>1460537339</CreateTime>";
    let cases = [
        (
            "<MsgType>image</MsgType><PicUrl>http://mmbiz.qpic.cn/1</PicUrl><MediaId>m1</MediaId><MsgId>1</MsgId>",
            MessageBody::Image {
                pic_url: "http://mmbiz.qpic.cn/1".to_string(),
                media_id: "m1".to_string(),
            },
        ),
        (
            "<MsgType>voice</MsgType><MediaId>m2</MediaId><Format>amr</Format><Recognition><![CDATA[腾讯微信团队]]></Recognition><MsgId>2</MsgId>",
            MessageBody::Voice {
                media_id: "m2".to_string(),
                format: "amr".to_string(),
                recognition: Some("腾讯微信团队".to_string()),
            },
        ),
        (
            "<MsgType>video</MsgType><MediaId>m3</MediaId><ThumbMediaId>t3</ThumbMediaId><MsgId>3</MsgId>",
            MessageBody::Video {
                media_id: "m3".to_string(),
                thumb_media_id: "t3".to_string(),
            },
        ),
        (
            "<MsgType>shortvideo</MsgType><MediaId>m4</MediaId><ThumbMediaId>t4</ThumbMediaId><MsgId>4</MsgId>",
            MessageBody::ShortVideo {
                media_id: "m4".to_string(),
                thumb_media_id: "t4".to_string(),
            },
        ),
        (
            "<MsgType>link</MsgType><Title>t</Title><Description>d</Description><Url>https://example.com/</Url><MsgId>5</MsgId>",
            MessageBody::Link {
                title: "t".to_string(),
                description: "d".to_string(),
                url: "https://example.com/".to_string(),
            },
        ),
    ];

    for (body, expected) in cases {
        let msg = parse(&format!("<xml>{header}{body}</xml>"));
        assert_eq!(msg.header.from_user_name, "o_1");
        assert_eq!(msg.header.create_time, 1460537339);
        assert!(msg.header.msg_id.is_some());
        assert_eq!(msg.body, expected);
    }
}

#[test]
fn test_event_kinds() {
    let cases = [
        (
            "<Event>subscribe</Event><EventKey>qrscene_123123</EventKey><Ticket>TICKET</Ticket>",
            Event::Subscribe {
                event_key: Some("qrscene_123123".to_string()),
                ticket: Some("TICKET".to_string()),
            },
        ),
        (
            "<Event>SCAN</Event><EventKey>SCENE_VALUE</EventKey><Ticket>TICKET</Ticket>",
            Event::Scan {
                event_key: "SCENE_VALUE".to_string(),
                ticket: "TICKET".to_string(),
            },
        ),
        (
            "<Event>LOCATION</Event><Latitude>23.137466</Latitude><Longitude>113.352425</Longitude><Precision>119.385040</Precision>",
            Event::Location {
                latitude: 23.137466,
                longitude: 113.352425,
                precision: 119.38504,
            },
        ),
        (
            "<Event>CLICK</Event><EventKey>V1001_TODAY_MUSIC</EventKey>",
            Event::Click {
                event_key: "V1001_TODAY_MUSIC".to_string(),
            },
        ),
        (
            "<Event>VIEW</Event><EventKey>http://www.example.com/</EventKey>",
            Event::View {
                url: "http://www.example.com/".to_string(),
            },
        ),
    ];

    for (body, expected) in cases {
        let msg = parse(&format!("<xml><MsgType>event</MsgType>{body}</xml>"));
        assert!(msg.is_event());
        assert_eq!(msg.header.msg_id, None);
        assert_eq!(msg.body, MessageBody::Event(expected));
    }
}

#[test]
fn test_malformed_body() {
    assert!(matches!(
        InboundMessage::parse(b"<xml><MsgType>text</MsgType>"),
        Err(WechatError::Xml(_))
    ));
}

#[test]
fn test_plain_callback_and_sealed_reply() {
    let channel = CryptoChannel::new(APPID, TOKEN, ENCODING_AES_KEY).unwrap();
    let body = b"<xml><ToUserName>gh_1</ToUserName><FromUserName>o_1</FromUserName><CreateTime>1</CreateTime><MsgType>text</MsgType><Content>ping</Content><MsgId>9</MsgId></xml>";

    let query = CallbackQuery {
        signature: callback_signature(TOKEN, "1460537339", "nonce"),
        timestamp: "1460537339".to_string(),
        nonce: "nonce".to_string(),
        encrypt_type: None,
        msg_signature: None,
    };
    let msg = channel.open_callback(body, &query).unwrap();

    let reply = Reply::text(&msg, "pong");
    let wire = channel.seal_reply(&reply, "1460537340", "nonce2").unwrap();

    let envelope = read_fields(&wire).unwrap();
    let signature = envelope.get("MsgSignature").unwrap();
    let plain = channel
        .decrypt_message(&wire, signature, "1460537340", "nonce2")
        .unwrap();

    let reply_fields = read_fields(&plain).unwrap();
    assert_eq!(reply_fields.get("ToUserName"), Some("o_1"));
    assert_eq!(reply_fields.get("FromUserName"), Some("gh_1"));
    assert_eq!(reply_fields.get("Content"), Some("pong"));
}

#[test]
fn test_reply_escapes_cdata_terminator() {
    let msg = parse("<xml><FromUserName>o_1</FromUserName><MsgType>text</MsgType><Content>x</Content></xml>");
    let xml = Reply::text(&msg, "a]]>b").to_xml(1);
    let fields = read_fields(xml.as_bytes()).unwrap();
    assert_eq!(fields.get("Content"), Some("a]]>b"));
}
