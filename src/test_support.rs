//! Shared fixtures for unit tests

use crate::error::{FetchError, FetchResult};
use crate::http::{HttpTransport, TransportRequest, TransportResponse};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::DuplexStream;
use zip::write::SimpleFileOptions;

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Status(u16, Vec<u8>),
    Fail(String),
    Hang,
    StallBody,
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Status(200, body.into())
    }
}

/// Scripted transport. Each URL has a queue of replies; the last reply
/// repeats. Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<TransportRequest>>,
    stalled: Mutex<Vec<DuplexStream>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(&self, url: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn hits(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => MockReply::Status(404, Vec::new()),
        }
    }

    async fn respond(&self, url: &str, mut reply: MockReply) -> FetchResult<TransportResponse> {
        while let MockReply::Delayed(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        match reply {
            MockReply::Status(status, body) => Ok(TransportResponse {
                status,
                body: Box::pin(Cursor::new(body)),
            }),
            MockReply::Fail(reason) => Err(FetchError::http(url, reason)),
            MockReply::Hang => std::future::pending().await,
            MockReply::StallBody => {
                let (writer, reader) = tokio::io::duplex(16);
                self.stalled.lock().unwrap().push(writer);
                Ok(TransportResponse {
                    status: 200,
                    body: Box::pin(reader),
                })
            }
            MockReply::Delayed(..) => unreachable!("delays are unwrapped above"),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: TransportRequest) -> FetchResult<TransportResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self.next_reply(&url);
        self.respond(&url, reply).await
    }
}

pub(crate) fn nuspec_xml(id: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Test Author</authors>
    <description>Test package {id}</description>
    <dependencies>
      <group targetFramework="net8.0">
        <dependency id="Dep.One" version="[1.0.0, )" exclude="Build" />
      </group>
    </dependencies>
  </metadata>
</package>"#
    )
}

/// A minimal valid nupkg
pub(crate) fn build_nupkg(id: &str, version: &str) -> Vec<u8> {
    build_nupkg_with(id, version, &[("lib/net8.0/Test.dll", &b"MZ"[..])])
}

pub(crate) fn build_nupkg_with(id: &str, version: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file(format!("{id}.nuspec"), options).unwrap();
    writer.write_all(nuspec_xml(id, version).as_bytes()).unwrap();

    writer.start_file("[Content_Types].xml", options).unwrap();
    writer.write_all(b"<Types/>").unwrap();

    writer.start_file("_rels/.rels", options).unwrap();
    writer.write_all(b"<Relationships/>").unwrap();

    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }

    writer.finish().unwrap().into_inner()
}
