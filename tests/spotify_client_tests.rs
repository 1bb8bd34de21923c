use chrono::Utc;
use mockito::{Matcher, Server};
use onetune::api::spotify::SpotifyClient;
use onetune::config::Config;
use onetune::error::ApiError;
use onetune::session::{CredentialStore, StoredToken};
use serde_json::json;

fn client_for(base: &str, store: &CredentialStore) -> SpotifyClient {
    let cfg = Config::from_toml_str(&format!(
        "client_id = \"test-client\"\napi_base = \"{}\"\npage_limit = 5",
        base
    ))
    .unwrap();
    SpotifyClient::new(&cfg, store.clone())
}

fn logged_in() -> CredentialStore {
    let store = CredentialStore::in_memory();
    store
        .save_token(&StoredToken {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now().timestamp() + 3600,
            refresh_token: None,
            scope: None,
        })
        .unwrap();
    store
}

fn track(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "uri": format!("spotify:track:{}", id),
        "duration_ms": 200000,
        "artists": [{"id": "a1", "name": "Adele"}, {"id": "a2", "name": "Guest"}],
        "album": {"id": "al1", "name": "25", "images": [{"url": "http://img/1", "width": 640, "height": 640}]}
    })
}

#[tokio::test]
async fn dashboard_fetches_profile_and_playlists_with_bearer() {
    let mut server = Server::new_async().await;
    let me = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "u1", "display_name": "Roman", "email": "r@example.com"}).to_string())
        .create_async()
        .await;
    let lists = server
        .mock("GET", "/me/playlists")
        .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"id": "p1", "name": "Road trip", "uri": "spotify:playlist:p1", "description": null,
                     "images": [], "owner": {"id": "u1", "display_name": "Roman"}}
                ],
                "next": null,
                "total": 1
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    let dash = api.dashboard().await.expect("dashboard");
    assert_eq!(dash.profile.display_name.as_deref(), Some("Roman"));
    assert!(dash.profile.images.is_empty());
    assert_eq!(dash.playlists.len(), 1);
    assert_eq!(dash.playlists[0].uri, "spotify:playlist:p1");
    me.assert_async().await;
    lists.assert_async().await;
}

#[tokio::test]
async fn liked_tracks_unwraps_saved_items() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"added_at": "2024-01-01T00:00:00Z", "track": track("t1", "Hello")},
                    {"added_at": "2024-01-02T00:00:00Z", "track": track("t2", "Skyfall")}
                ],
                "next": null,
                "total": 2
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    let tracks = api.liked_tracks().await.unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].name, "Hello");
    assert_eq!(tracks[0].artist_names(), "Adele, Guest");
    assert_eq!(tracks[0].cover_url(), Some("http://img/1"));
}

#[tokio::test]
async fn search_encodes_query_and_reads_track_page() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "rolling in the deep".into()),
            Matcher::UrlEncoded("type".into(), "track".into()),
            Matcher::UrlEncoded("limit".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"tracks": {"items": [track("t3", "Rolling in the Deep")], "next": null, "total": 1}}).to_string())
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    let found = api.search_tracks("rolling in the deep").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uri, "spotify:track:t3");
}

#[tokio::test]
async fn rejected_token_is_cleared() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": {"status": 401, "message": "The access token expired"}}).to_string())
        .create_async()
        .await;

    let store = logged_in();
    let api = client_for(&server.url(), &store);
    let err = api.current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    assert!(store.token().unwrap().is_none());

    // the next call does not reach the network
    assert!(matches!(api.current_user().await, Err(ApiError::NotAuthenticated)));
}

#[tokio::test]
async fn no_token_means_no_request() {
    let mut server = Server::new_async().await;
    let never = server.mock("GET", "/me").expect(0).create_async().await;

    let api = client_for(&server.url(), &CredentialStore::in_memory());
    assert!(matches!(api.current_user().await, Err(ApiError::NotAuthenticated)));
    never.assert_async().await;
}

#[tokio::test]
async fn other_failures_keep_the_token() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me/player/devices")
        .with_status(503)
        .with_body("try later")
        .create_async()
        .await;

    let store = logged_in();
    let api = client_for(&server.url(), &store);
    match api.devices().await {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "try later");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(store.token().unwrap().is_some());
}

#[tokio::test]
async fn nothing_playing_is_none() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me/player")
        .with_status(204)
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    assert_eq!(api.playback_state().await.unwrap(), None);
}

#[tokio::test]
async fn playback_state_is_parsed() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me/player")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "is_playing": true,
                "progress_ms": 1200,
                "item": track("t1", "Hello"),
                "device": {"id": "d1", "name": "Kitchen", "is_active": true, "type": "Speaker"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    let state = api.playback_state().await.unwrap().expect("state");
    assert!(!state.paused());
    assert_eq!(state.current_track().map(|t| t.name.as_str()), Some("Hello"));
    assert_eq!(state.device.unwrap().kind.as_deref(), Some("Speaker"));
}

#[tokio::test]
async fn play_uri_picks_uris_or_context() {
    let mut server = Server::new_async().await;
    let single = server
        .mock("PUT", "/me/player/play")
        .match_body(Matcher::Json(json!({"uris": ["spotify:track:t1"]})))
        .with_status(204)
        .create_async()
        .await;
    let context = server
        .mock("PUT", "/me/player/play")
        .match_body(Matcher::Json(json!({"context_uri": "spotify:playlist:p1"})))
        .with_status(204)
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    api.play_uri("spotify:track:t1").await.unwrap();
    api.play_uri("spotify:playlist:p1").await.unwrap();
    single.assert_async().await;
    context.assert_async().await;
}

#[tokio::test]
async fn transfer_playback_names_the_device() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("PUT", "/me/player")
        .match_body(Matcher::Json(json!({"device_ids": ["d1"], "play": false})))
        .with_status(204)
        .create_async()
        .await;

    let api = client_for(&server.url(), &logged_in());
    api.transfer_playback("d1", false).await.unwrap();
    m.assert_async().await;
}
