use std::time::Duration;

use catalog_core::error::DeliveryError;
use reqwest::header::CONTENT_TYPE;

/// Transport for custom resource responses. One call per response, no retry.
pub trait ResponseSink {
    fn deliver(&self, endpoint: &str, body: &[u8], timeout: Duration)
        -> Result<(), DeliveryError>;
}

/// Uploads the response body to the presigned callback URL.
#[derive(Debug, Clone, Default)]
pub struct HttpResponseSink {
    client: reqwest::Client,
}

impl HttpResponseSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ResponseSink for HttpResponseSink {
    fn deliver(
        &self,
        endpoint: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let client = self.client.clone();
        let url = endpoint.to_string();
        let body_bytes = body.to_vec();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                // The presigned URL is signed without a content type.
                let response = client
                    .put(url)
                    .header(CONTENT_TYPE, "")
                    .body(body_bytes)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|error| DeliveryError::Transport(error.to_string()))?;

                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(DeliveryError::Rejected {
                        status: status.as_u16(),
                    })
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    use super::*;

    struct CapturedRequest {
        head: String,
        body: Vec<u8>,
    }

    /// Accepts a single HTTP/1.1 request and answers it with `status_line`.
    fn serve_once(status_line: &'static str) -> (String, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let endpoint = format!(
            "http://{}/callback?X-Amz-Signature=abc",
            listener.local_addr().expect("local addr")
        );

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }

            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).expect("read body");

            let mut stream = stream;
            write!(stream, "{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .expect("write response");
            CapturedRequest { head, body }
        });

        (endpoint, handle)
    }

    fn sink() -> HttpResponseSink {
        HttpResponseSink::new(
            reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("build client"),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn puts_json_body_with_empty_content_type() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK");
        let body = br#"{"Status":"SUCCESS","PhysicalResourceId":"role-split-1"}"#;

        sink()
            .deliver(&endpoint, body, Duration::from_secs(5))
            .expect("delivery succeeds");

        let request = server.join().expect("server thread");
        let request_line = request.head.lines().next().unwrap_or_default();
        assert!(request_line.starts_with("PUT /callback?X-Amz-Signature=abc "));
        let content_type = request
            .head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.trim().to_string());
        assert_eq!(content_type.as_deref(), Some(""));
        assert_eq!(request.body, body.to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_success_status_is_rejected() {
        let (endpoint, server) = serve_once("HTTP/1.1 403 Forbidden");

        let error = sink()
            .deliver(&endpoint, b"{}", Duration::from_secs(5))
            .expect_err("forbidden");

        server.join().expect("server thread");
        assert_eq!(error, DeliveryError::Rejected { status: 403 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let endpoint = format!("http://{}/callback", listener.local_addr().expect("addr"));
        drop(listener);

        let error = sink()
            .deliver(&endpoint, b"{}", Duration::from_secs(5))
            .expect_err("connection refused");

        assert!(matches!(error, DeliveryError::Transport(_)));
    }
}
