//! HTTP surface over hyper.

use crate::error_page::ErrorPage;
use crate::handler::{RenderHandler, RenderRequest};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Default maximum request body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Serves a [`RenderHandler`] as a hyper service.
#[derive(Debug, Clone)]
pub struct RenderService {
	handler: Arc<RenderHandler>,
	max_body_size: u64,
}

impl RenderService {
	/// Creates a service with the default body limit.
	pub fn new(handler: Arc<RenderHandler>) -> Self {
		Self {
			handler,
			max_body_size: DEFAULT_MAX_BODY_SIZE,
		}
	}

	/// Sets the request body limit.
	pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
		self.max_body_size = max_body_size;
		self
	}
}

/// Handles a buffered request, turning render errors into error pages.
pub async fn respond(handler: &RenderHandler, request: http::Request<Bytes>) -> http::Response<Bytes> {
	let request = RenderRequest::from(request);
	let url = request.url().to_string();
	match handler.handle(request).await {
		Ok(response) => response.into(),
		Err(error) => {
			tracing::warn!(%error, url = %url, "serving error page");
			ErrorPage::new(error.to_app_error(), url)
				.render(handler)
				.await
				.into()
		}
	}
}

fn plain(status: StatusCode, text: &'static str) -> hyper::Response<Full<Bytes>> {
	let mut response = hyper::Response::new(Full::new(Bytes::from_static(text.as_bytes())));
	*response.status_mut() = status;
	response
}

impl Service<hyper::Request<Incoming>> for RenderService {
	type Response = hyper::Response<Full<Bytes>>;
	type Error = Box<dyn std::error::Error + Send + Sync>;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
		let handler = self.handler.clone();
		let max_body_size = self.max_body_size;

		Box::pin(async move {
			if let Some(content_length) = req.headers().get(hyper::header::CONTENT_LENGTH)
				&& let Ok(len_str) = content_length.to_str()
				&& let Ok(len) = len_str.parse::<u64>()
				&& len > max_body_size
			{
				return Ok(plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
			}

			let (parts, body) = req.into_parts();
			let body = match http_body_util::Limited::new(body, max_body_size as usize)
				.collect()
				.await
			{
				Ok(collected) => collected.to_bytes(),
				Err(error) => {
					tracing::debug!(%error, "failed to read request body");
					return Ok(plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
				}
			};

			let response = respond(&handler, http::Request::from_parts(parts, body)).await;
			Ok(response.map(Full::new))
		})
	}
}

/// Serves one connection.
pub async fn serve_connection(stream: TcpStream, service: RenderService) -> Result<(), hyper::Error> {
	http1::Builder::new()
		.serve_connection(TokioIo::new(stream), service)
		.await
}

/// Accepts connections until `shutdown` resolves.
pub async fn serve_with_shutdown(
	listener: TcpListener,
	service: RenderService,
	shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
	tokio::pin!(shutdown);
	loop {
		tokio::select! {
			result = listener.accept() => {
				let (stream, peer) = result?;
				let service = service.clone();
				tokio::task::spawn(async move {
					if let Err(error) = serve_connection(stream, service).await {
						tracing::debug!(%error, %peer, "connection closed with error");
					}
				});
			}
			_ = &mut shutdown => {
				tracing::info!("render server shutting down");
				return Ok(());
			}
		}
	}
}

/// Binds `addr` and serves `handler` forever.
pub async fn serve(addr: SocketAddr, handler: Arc<RenderHandler>) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	tracing::info!(%addr, "render server listening");
	serve_with_shutdown(listener, RenderService::new(handler), std::future::pending()).await
}
