//! LoginClient: a thin REST exchange against the game's login endpoint.
//!
//! No retry logic of its own beyond whatever `HttpFetcher` already does,
//! and no interesting state -- just a username/password POST that comes
//! back as a success, a failure banner, or a "need the 2FA/queue token"
//! status, passed through verbatim to the caller.

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::http::HttpFetcher;

/// The login endpoint's response, passed through to the menu layer
/// unexamined except for which variant it is.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "success")]
pub enum LoginResult {
	#[serde(rename = "true")]
	Ok { username: String, cookie: String },
	#[serde(rename = "false")]
	Failed { banner: String },
	#[serde(rename = "partial")]
	NeedsToonTask { banner: String, response_token: String },
}

pub struct LoginClient<'a> {
	http: &'a HttpFetcher,
	login_url: Url,
}

impl<'a> LoginClient<'a> {
	pub fn new(http: &'a HttpFetcher, login_url: Url) -> Self {
		Self { http, login_url }
	}

	pub fn login(&self, username: &str, password: &str) -> Result<LoginResult, Error> {
		self.http
			.post_form(&self.login_url, &[("username", username), ("password", password)])
	}

	/// Submit a queue/2FA token returned by an earlier `NeedsToonTask`
	/// response.
	pub fn submit_token(&self, app_token: &str, auth_token: &str) -> Result<LoginResult, Error> {
		self.http.post_form(
			&self.login_url,
			&[("appToken", app_token), ("authToken", auth_token)],
		)
	}
}
