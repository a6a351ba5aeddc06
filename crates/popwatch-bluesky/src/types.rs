//! AT Protocol request and response bodies used by [`BlueskyClient`](crate::BlueskyClient).
//!
//! Field names follow the lexicon JSON (camelCase); only the fields this
//! client reads or writes are modelled.

use serde::{Deserialize, Serialize};

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
const IMAGES_EMBED_TYPE: &str = "app.bsky.embed.images";

// ---------------------------------------------------------------------------
// com.atproto.server.createSession / refreshSession
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub handle: String,
    pub did: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_jwt", &"[redacted]")
            .field("refresh_jwt", &"[redacted]")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// com.atproto.repo.uploadBlob
// ---------------------------------------------------------------------------

/// The blob reference is passed back verbatim inside the post embed, so it
/// is kept as opaque JSON.
#[derive(Debug, Deserialize)]
pub struct UploadBlobResponse {
    pub blob: serde_json::Value,
}

// ---------------------------------------------------------------------------
// com.atproto.repo.createRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

/// An `app.bsky.feed.post` record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub text: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ImagesEmbed>,
    pub langs: Vec<String>,
}

impl PostRecord {
    #[must_use]
    pub fn new(text: String, created_at: String, facets: Vec<Facet>, images: Vec<EmbeddedImage>) -> Self {
        let embed = (!images.is_empty()).then(|| ImagesEmbed {
            embed_type: IMAGES_EMBED_TYPE,
            images,
        });
        Self {
            record_type: POST_COLLECTION,
            text,
            created_at,
            facets,
            embed,
            langs: vec!["en".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagesEmbed {
    #[serde(rename = "$type")]
    pub embed_type: &'static str,
    pub images: Vec<EmbeddedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedImage {
    pub alt: String,
    pub image: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Rich-text facets
// ---------------------------------------------------------------------------

/// A rich-text annotation over a UTF-8 byte range of the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// XRPC error body: `{"error": "ExpiredToken", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_record_serializes_lexicon_shape() {
        let record = PostRecord::new(
            "hi #Funko".to_string(),
            "2026-02-16T12:00:00.000Z".to_string(),
            vec![Facet {
                index: ByteSlice {
                    byte_start: 3,
                    byte_end: 9,
                },
                features: vec![FacetFeature::Tag {
                    tag: "Funko".to_string(),
                }],
            }],
            vec![EmbeddedImage {
                alt: "a figure".to_string(),
                image: serde_json::json!({"$type": "blob", "size": 10}),
            }],
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["$type"], "app.bsky.feed.post");
        assert_eq!(json["createdAt"], "2026-02-16T12:00:00.000Z");
        assert_eq!(json["facets"][0]["index"]["byteStart"], 3);
        assert_eq!(json["facets"][0]["features"][0]["$type"], "app.bsky.richtext.facet#tag");
        assert_eq!(json["facets"][0]["features"][0]["tag"], "Funko");
        assert_eq!(json["embed"]["$type"], "app.bsky.embed.images");
        assert_eq!(json["embed"]["images"][0]["alt"], "a figure");
        assert_eq!(json["embed"]["images"][0]["image"]["size"], 10);
    }

    #[test]
    fn post_without_images_has_no_embed() {
        let record = PostRecord::new("plain".to_string(), "t".to_string(), Vec::new(), Vec::new());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("embed").is_none());
        assert!(json.get("facets").is_none());
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = Session {
            access_jwt: "secret-access".to_string(),
            refresh_jwt: "secret-refresh".to_string(),
            handle: "bot.bsky.social".to_string(),
            did: "did:plc:abc".to_string(),
        };
        let out = format!("{session:?}");
        assert!(!out.contains("secret"));
        assert!(out.contains("bot.bsky.social"));
    }
}
