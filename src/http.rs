//! HTTP fetching: JSON GETs, streaming GETs, and form POSTs, all wrapped in
//! a uniform bounded-retry policy (N attempts, fixed sleep, only for
//! transport failures and non-2xx responses -- a response that arrives but
//! fails to decode is not retried).

use std::io::Read;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

/// Small files (manifests, mirror lists) we read fully into memory; cap it
/// generously but not unboundedly.
const SMALL_BODY_LIMIT: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
	agent: ureq::Agent,
	retry_count: u32,
	retry_interval: Duration,
}

impl HttpFetcher {
	pub fn new(timeout: Duration, retry_count: u32, retry_interval: Duration) -> Self {
		let agent = ureq::AgentBuilder::new()
			.timeout_connect(timeout)
			.timeout_read(timeout)
			.build();
		Self {
			agent,
			retry_count,
			retry_interval,
		}
	}

	/// GET `url`, decode as JSON. Retries on transport/non-2xx errors;
	/// decode failures are not retried.
	pub fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, Error> {
		let body = self.retry(url, || get_bytes(&self.agent, url))?;
		serde_json::from_slice(&body).map_err(|e| Error::Decode {
			url: url.to_string(),
			source: e,
		})
	}

	/// Streaming GET. Returns a declared content length (if present) and a
	/// boxed reader the caller pulls chunks from. Only the initial
	/// connection attempt is covered by the retry policy -- mid-stream
	/// failures are the caller's (`PatchExecutor`'s) problem, since it
	/// already wraps the whole fetch step in its own outer retry.
	pub fn get_stream(&self, url: &Url) -> Result<(Option<u64>, Box<dyn Read + Send>), Error> {
		let resp = self.retry(url, || {
			self.agent
				.request_url("GET", url)
				.call()
				.map_err(Box::new)
		})?;
		let len = resp
			.header("Content-Length")
			.and_then(|l| l.parse::<u64>().ok());
		Ok((len, Box::new(resp.into_reader())))
	}

	/// POST a form body, decode the JSON response. Used by `LoginClient`;
	/// kept here because the fetcher (and its retry/timeout policy) is
	/// shared, not because login is otherwise part of the patcher core.
	pub fn post_form<T: DeserializeOwned>(
		&self,
		url: &Url,
		form: &[(&str, &str)],
	) -> Result<T, Error> {
		let body = self.retry(url, || {
			self.agent
				.request_url("POST", url)
				.send_form(form)
				.map_err(Box::new)
				.and_then(|resp| {
					let mut data = Vec::new();
					resp.into_reader()
						.take(SMALL_BODY_LIMIT)
						.read_to_end(&mut data)
						.map_err(|e| Box::new(ureq::Error::from(e)))?;
					Ok(data)
				})
		})?;
		serde_json::from_slice(&body).map_err(|e| Error::Decode {
			url: url.to_string(),
			source: e,
		})
	}

	/// Run `attempt` up to `retry_count` times with `retry_interval`
	/// sleeps in between, only retrying transport/non-2xx (`ureq::Error`)
	/// failures.
	fn retry<T>(
		&self,
		url: &Url,
		mut attempt: impl FnMut() -> Result<T, Box<ureq::Error>>,
	) -> Result<T, Error> {
		let mut last_err = None;
		for try_n in 0..self.retry_count.max(1) {
			match attempt() {
				Ok(v) => return Ok(v),
				Err(e) => {
					log::warn!("request to {url} failed (attempt {}): {e}", try_n + 1);
					last_err = Some(e);
					if try_n + 1 < self.retry_count.max(1) {
						thread::sleep(self.retry_interval);
					}
				}
			}
		}
		Err(Error::Network {
			url: url.to_string(),
			source: last_err.expect("loop runs at least once"),
		})
	}
}

/// Backend for `get_json`/small-body fetches: GET and dump the body into a
/// `Vec<u8>`.
fn get_bytes(agent: &ureq::Agent, url: &Url) -> Result<Vec<u8>, Box<ureq::Error>> {
	let resp = agent.request_url("GET", url).call().map_err(Box::new)?;
	let clen: Option<usize> = resp.header("Content-Length").and_then(|l| l.parse().ok());
	let mut data = match clen {
		Some(n) => Vec::with_capacity(n),
		None => Vec::new(),
	};
	resp.into_reader()
		.take(SMALL_BODY_LIMIT)
		.read_to_end(&mut data)
		.map_err(|e| Box::new(ureq::Error::from(e)))?;
	Ok(data)
}

#[cfg(test)]
mod tests {
	use super::*;
	use httptest::{matchers::*, responders::*, Expectation, Server};

	#[test]
	fn get_json_decodes_body() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("GET", "/m.json"))
				.respond_with(status_code(200).body(r#"{"a":1}"#)),
		);
		let url = Url::parse(&server.url("/m.json").to_string()).unwrap();
		let fetcher = HttpFetcher::new(Duration::from_secs(5), 3, Duration::from_millis(1));
		let v: serde_json::Value = fetcher.get_json(&url).unwrap();
		assert_eq!(v["a"], 1);
	}

	#[test]
	fn get_json_retries_on_failure_then_succeeds() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("GET", "/flaky"))
				.times(2)
				.respond_with(status_code(503)),
		);
		server.expect(
			Expectation::matching(request::method_path("GET", "/flaky"))
				.respond_with(status_code(200).body(r#"{"ok":true}"#)),
		);
		let url = Url::parse(&server.url("/flaky").to_string()).unwrap();
		let fetcher = HttpFetcher::new(Duration::from_secs(5), 3, Duration::from_millis(1));
		let v: serde_json::Value = fetcher.get_json(&url).unwrap();
		assert_eq!(v["ok"], true);
	}

	#[test]
	fn get_json_gives_up_after_retry_count() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("GET", "/dead"))
				.times(3)
				.respond_with(status_code(500)),
		);
		let url = Url::parse(&server.url("/dead").to_string()).unwrap();
		let fetcher = HttpFetcher::new(Duration::from_secs(5), 3, Duration::from_millis(1));
		let err = fetcher.get_json::<serde_json::Value>(&url).unwrap_err();
		assert!(matches!(err, Error::Network { .. }));
	}

	#[test]
	fn decode_errors_are_not_retried() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("GET", "/bad-json"))
				.times(1)
				.respond_with(status_code(200).body("not json")),
		);
		let url = Url::parse(&server.url("/bad-json").to_string()).unwrap();
		let fetcher = HttpFetcher::new(Duration::from_secs(5), 3, Duration::from_millis(1));
		let err = fetcher.get_json::<serde_json::Value>(&url).unwrap_err();
		assert!(matches!(err, Error::Decode { .. }));
	}
}
