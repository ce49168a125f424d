//! Legacy reply translation.
//!
//! Old-style providers answer with a float confidence and an opaque
//! `callback_data` object and keep playback to themselves. Their replies are
//! mapped onto regular entries with `PlaybackType::Skill`; `callback_data`
//! travels along in the entry's extension fields so the provider gets it back
//! in the play command.

use core_media::{MediaEntry, MediaType, PlaybackType};
use core_runtime::events::LegacyResponse;
use serde_json::{Map, Value};

/// Extension key carrying the provider's original `callback_data`.
pub const CALLBACK_DATA_KEY: &str = "callback_data";

/// URI given to legacy matches that name no stream of their own.
pub fn callback_uri(skill_id: &str) -> String {
    format!("callback://{}", skill_id)
}

fn first_str<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn media_type_of(data: &Map<String, Value>) -> MediaType {
    match data.get("media_type") {
        Some(Value::Number(code)) => code.as_u64().map(MediaType::from_code).unwrap_or_default(),
        Some(Value::String(name)) => {
            serde_json::from_value(Value::String(name.clone())).unwrap_or_default()
        }
        _ => MediaType::Generic,
    }
}

/// Rescale a `0.0..=1.0` confidence to `0..=100`.
pub fn rescale_confidence(conf: f64) -> u8 {
    if !conf.is_finite() {
        return 0;
    }
    (conf * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Translate a legacy reply into an entry.
pub fn translate(reply: &LegacyResponse) -> MediaEntry {
    let empty = Map::new();
    let data = reply.callback_data.as_object().unwrap_or(&empty);

    let uri = first_str(data, &["stream", "url", "uri"])
        .map(str::to_string)
        .unwrap_or_else(|| callback_uri(&reply.skill_id));
    let title = first_str(data, &["title", "name"]).unwrap_or(&reply.phrase);

    let mut entry = MediaEntry::new(uri)
        .with_title(title)
        .with_provider(reply.skill_id.clone())
        .with_confidence(rescale_confidence(reply.conf))
        .with_media_type(media_type_of(data))
        .with_playback_type(PlaybackType::Skill)
        .with_extra(CALLBACK_DATA_KEY, reply.callback_data.clone());

    if let Some(artist) = first_str(data, &["artist", "author"]) {
        entry = entry.with_artist(artist);
    }
    if let Some(image) = first_str(data, &["image", "logo", "picture"]) {
        entry = entry.with_image(image);
    }
    if let Some(background) = first_str(data, &["bg_image", "background", "image"]) {
        entry = entry.with_background_image(background);
    }
    if let Some(length) = data.get("length").and_then(Value::as_u64) {
        entry = entry.with_length(length);
    }

    entry
}
