//! Content generators and a scripted Swift endpoint

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::TEST_CONTAINER;

/// Token handed out by the mock auth endpoint
pub const TEST_TOKEN: &str = "AUTH_tk_integration";

/// CSV rows `"{task},{row}\n"` for one task, one buffer per row
pub fn csv_rows(task_index: u32, rows: u32) -> Vec<Vec<u8>> {
    (0..rows)
        .map(|row| format!("{task_index},{row}\n").into_bytes())
        .collect()
}

/// Concatenation of buffers, in order
pub fn concat(buffers: &[Vec<u8>]) -> Vec<u8> {
    buffers.iter().flatten().copied().collect()
}

/// A mock Swift cluster speaking TempAuth
pub struct SwiftMock {
    pub server: MockServer,
}

impl SwiftMock {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1.0"))
            .and(header("X-Auth-User", "test:tester"))
            .and(header("X-Auth-Key", "testing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Storage-Url", format!("{}/v1/AUTH_test", server.uri()))
                    .insert_header("X-Auth-Token", TEST_TOKEN),
            )
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1.0", self.server.uri())
    }

    pub fn object_path(key: &str) -> String {
        format!("/v1/AUTH_test/{TEST_CONTAINER}/{key}")
    }

    /// Answer HEAD on the container with `status`
    pub async fn container_status(&self, status: u16) {
        Mock::given(method("HEAD"))
            .and(path(format!("/v1/AUTH_test/{TEST_CONTAINER}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Accept container creation
    pub async fn accept_container_create(&self) {
        Mock::given(method("PUT"))
            .and(path(format!("/v1/AUTH_test/{TEST_CONTAINER}")))
            .and(header("X-Auth-Token", TEST_TOKEN))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Fail the first `failures` puts of `key` with `status`, then accept
    pub async fn object_put(&self, key: &str, failures: u64, status: u16) {
        if failures > 0 {
            Mock::given(method("PUT"))
                .and(path(Self::object_path(key)))
                .respond_with(ResponseTemplate::new(status))
                .up_to_n_times(failures)
                .mount(&self.server)
                .await;
        }
        Mock::given(method("PUT"))
            .and(path(Self::object_path(key)))
            .and(header("X-Auth-Token", TEST_TOKEN))
            .respond_with(ResponseTemplate::new(201))
            .mount(&self.server)
            .await;
    }

    /// Bodies of every PUT received for `key`, in arrival order
    pub async fn put_bodies(&self, key: &str) -> Vec<Vec<u8>> {
        let object_path = Self::object_path(key);
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "PUT" && r.url.path() == object_path)
            .map(|r| r.body)
            .collect()
    }
}
