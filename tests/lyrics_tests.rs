use mockito::Server;
use onetune::api::lyrics::LyricsClient;
use serde_json::json;

#[tokio::test]
async fn lyrics_found() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/Adele/Hello")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"lyrics": "Hello, it's me"}).to_string())
        .create_async()
        .await;

    let client = LyricsClient::new(&format!("{}/", server.url()));
    let lyrics = client.fetch("Adele", "Hello").await.unwrap();
    assert_eq!(lyrics.as_deref(), Some("Hello, it's me"));
    m.assert_async().await;
}

#[tokio::test]
async fn unknown_song_has_no_lyrics() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/Adele/Nope")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": "No lyrics found"}).to_string())
        .create_async()
        .await;
    let _blank = server
        .mock("GET", "/Adele/Silence")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"lyrics": "  "}).to_string())
        .create_async()
        .await;

    let client = LyricsClient::new(&server.url());
    assert_eq!(client.fetch("Adele", "Nope").await.unwrap(), None);
    assert_eq!(client.fetch("Adele", "Silence").await.unwrap(), None);
}

#[tokio::test]
async fn service_failure_is_an_error() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/Adele/Hello")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let client = LyricsClient::new(&server.url());
    let err = client.fetch("Adele", "Hello").await.unwrap_err();
    assert!(err.to_string().contains("500"));
}
