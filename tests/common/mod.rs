//! Shared helpers for iptvcheck integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const USER: &str = "alice";
pub const PASS: &str = "s3cret";

pub fn live_streams_json() -> Value {
    json!([
        {"num": 1, "name": "BBC One HD", "stream_id": 101, "category_id": "1", "tv_archive": 1, "epg_channel_id": "bbc1.uk"},
        {"num": 2, "name": "Sky Sports Main Event", "stream_id": "102", "category_id": "2", "tv_archive": 0, "epg_channel_id": null},
        {"num": 3, "name": "BBC News", "stream_id": 103, "category_id": 1, "tv_archive": "1", "epg_channel_id": ""}
    ])
}

pub fn live_categories_json() -> Value {
    json!([
        {"category_id": "1", "category_name": "UK", "parent_id": 0},
        {"category_id": "2", "category_name": "Sport", "parent_id": 0}
    ])
}

fn player_api(action: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path("/player_api.php"))
        .and(query_param("username", USER))
        .and(query_param("password", PASS))
        .and(query_param("action", action))
}

/// Mount the channel list and categories on `server`.
pub async fn mount_catalog(server: &MockServer) {
    player_api("get_live_streams")
        .respond_with(ResponseTemplate::new(200).set_body_json(live_streams_json()))
        .mount(server)
        .await;
    player_api("get_live_categories")
        .respond_with(ResponseTemplate::new(200).set_body_json(live_categories_json()))
        .mount(server)
        .await;
}

/// Answer `get_short_epg` for `stream_id` with `count` listings.
pub async fn mount_epg(server: &MockServer, stream_id: u64, count: usize) {
    let listings: Vec<Value> = (0..count)
        .map(|i| json!({"id": i.to_string(), "title": "UHJvZ3JhbW1l", "start": "2026-01-01 10:00:00"}))
        .collect();
    player_api("get_short_epg")
        .and(query_param("stream_id", stream_id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"epg_listings": listings})))
        .mount(server)
        .await;
}
