//! Channel flows against a stateful stand-in for the remote tree store:
//! visibility filtering, upload conflicts, delete authorization, and
//! variant selection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use satchel_app::notes::{ChannelError, ChannelSelector};
use satchel_app::{Satchel, SatchelConfig};
use stash::loader::DocumentSource;
use stash::remote::RemoteConfig;
use study_utils::{Credentials, Visibility};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Minimal JSON tree server: flat `path -> value` storage, where reading a
/// path that only exists as a prefix returns its direct children as an
/// object, the way the real store lists a node.
struct TreeServer {
    base_url: String,
    nodes: Arc<Mutex<BTreeMap<String, serde_json::Value>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TreeServer {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let nodes: Arc<Mutex<BTreeMap<String, serde_json::Value>>> =
            Arc::new(Mutex::new(BTreeMap::new()));
        let state = nodes.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                let header_end = loop {
                    let Ok(n) = socket.read(&mut buf).await else {
                        break None;
                    };
                    if n == 0 {
                        break None;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else { continue };

                let head = String::from_utf8_lossy(&request[..header_end]).into_owned();
                let mut lines = head.lines();
                let request_line = lines.next().unwrap_or_default().to_string();
                let content_length = lines
                    .filter_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .next()
                    .unwrap_or(0);

                let mut body = request[header_end..].to_vec();
                while body.len() < content_length {
                    let Ok(n) = socket.read(&mut buf).await else { break };
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&buf[..n]);
                }

                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let target = parts.next().unwrap_or_default();
                let path = target
                    .split('?')
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .trim_end_matches(".json")
                    .to_string();

                let response_body = {
                    let mut nodes = state.lock().unwrap();
                    match method.as_str() {
                        "GET" => {
                            if let Some(value) = nodes.get(&path) {
                                value.to_string()
                            } else {
                                // list the node's direct children, if any
                                let prefix = format!("{path}/");
                                let children: serde_json::Map<String, serde_json::Value> = nodes
                                    .iter()
                                    .filter_map(|(key, value)| {
                                        let rest = key.strip_prefix(&prefix)?;
                                        (!rest.contains('/'))
                                            .then(|| (rest.to_string(), value.clone()))
                                    })
                                    .collect();
                                if children.is_empty() {
                                    "null".to_string()
                                } else {
                                    serde_json::Value::Object(children).to_string()
                                }
                            }
                        }
                        "PUT" => {
                            let value: serde_json::Value =
                                serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                            nodes.insert(path, value.clone());
                            value.to_string()
                        }
                        "DELETE" => {
                            nodes.remove(&path);
                            "null".to_string()
                        }
                        _ => "null".to_string(),
                    }
                };

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            nodes,
            handle,
        }
    }

    fn stored(&self, path: &str) -> Option<serde_json::Value> {
        self.nodes.lock().unwrap().get(path).cloned()
    }
}

impl Drop for TreeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn client_against(server: &TreeServer, dir: &tempfile::TempDir) -> Satchel {
    Satchel::new(SatchelConfig {
        data_dir: dir.path().to_path_buf(),
        content_base_url: "http://127.0.0.1:1".to_string(),
        grading_base_url: "http://127.0.0.1:1".to_string(),
        remote: RemoteConfig {
            base_url: server.base_url.clone(),
            auth_token: None,
        },
    })
    .await
    .unwrap()
}

fn creds(name: &str, secret: &str) -> Credentials {
    Credentials {
        name: name.to_string(),
        secret: secret.to_string(),
    }
}

const NOTE: &str = "math/chapter1.md";

#[tokio::test]
async fn private_channels_are_hidden_from_other_viewers() {
    let server = TreeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = client_against(&server, &dir).await;
    let notes = app.notes();

    let ada = creds("ada", "ada-secret");
    let bob = creds("bob", "bob-secret");
    notes
        .upload(NOTE, &ada, "# Ada's take".to_string(), Visibility::Public)
        .await
        .unwrap();
    notes
        .upload(NOTE, &bob, "# Bob's draft".to_string(), Visibility::Private)
        .await
        .unwrap();

    let anonymous = notes.list_channels(NOTE, None).await.unwrap();
    assert_eq!(anonymous.len(), 1);
    assert_eq!(anonymous[0].owner_name, "ada");

    let for_bob = notes.list_channels(NOTE, Some(&bob)).await.unwrap();
    assert_eq!(for_bob.len(), 2);

    let for_ada = notes.list_channels(NOTE, Some(&ada)).await.unwrap();
    assert_eq!(for_ada.len(), 1);
}

#[tokio::test]
async fn a_conflicting_upload_leaves_the_stored_channel_unchanged() {
    let server = TreeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = client_against(&server, &dir).await;
    let notes = app.notes();

    let ada = creds("ada", "ada-secret");
    let id = notes
        .upload(NOTE, &ada, "original".to_string(), Visibility::Public)
        .await
        .unwrap();

    let impostor = creds("ada", "guessed-wrong");
    let error = notes
        .upload(NOTE, &impostor, "tampered".to_string(), Visibility::Public)
        .await
        .unwrap_err();
    assert!(matches!(error, ChannelError::Conflict));

    let stored = server
        .stored(&format!("notes/math/chapter1%2Emd/{id}"))
        .unwrap();
    assert_eq!(stored["content"], "original");

    // the right secret overwrites
    notes
        .upload(NOTE, &ada, "revised".to_string(), Visibility::Public)
        .await
        .unwrap();
    let stored = server
        .stored(&format!("notes/math/chapter1%2Emd/{id}"))
        .unwrap();
    assert_eq!(stored["content"], "revised");
}

#[tokio::test]
async fn deleting_needs_the_exact_credential_pair() {
    let server = TreeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = client_against(&server, &dir).await;
    let notes = app.notes();

    let ada = creds("ada", "ada-secret");
    let id = notes
        .upload(NOTE, &ada, "# mine".to_string(), Visibility::Public)
        .await
        .unwrap();

    let error = notes
        .delete_channel(NOTE, &id, &creds("ada", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(error, ChannelError::Auth));
    assert!(server.stored(&format!("notes/math/chapter1%2Emd/{id}")).is_some());

    notes.delete_channel(NOTE, &id, &ada).await.unwrap();
    assert!(server.stored(&format!("notes/math/chapter1%2Emd/{id}")).is_none());
}

#[tokio::test]
async fn selecting_a_channel_replaces_the_active_document_wholesale() {
    let server = TreeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = client_against(&server, &dir).await;
    let notes = app.notes();

    let ada = creds("ada", "ada-secret");
    let id = notes
        .upload(NOTE, &ada, "# Ada's take".to_string(), Visibility::Public)
        .await
        .unwrap();

    notes.save(NOTE, "my local edit").await.unwrap();
    let document = notes
        .select_channel(NOTE, &ChannelSelector::Channel(id))
        .await
        .unwrap();
    assert_eq!(document.content, "# Ada's take");
    assert_eq!(document.source, DocumentSource::Channel);

    // the selection is now the cached document too
    let reloaded = notes.load(NOTE).await.unwrap();
    assert_eq!(reloaded.content, "# Ada's take");
    assert_eq!(reloaded.source, DocumentSource::Channel);
}

#[tokio::test]
async fn selecting_a_vanished_channel_surfaces_instead_of_healing() {
    let server = TreeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = client_against(&server, &dir).await;

    let error = app
        .notes()
        .select_channel(NOTE, &ChannelSelector::Channel("ghost".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(error, ChannelError::Malformed { .. }));
}
