//! HTTP server for the provisioning portal.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via std::net).
//! Requests are drained with `try_recv` from the control loop, so no server
//! thread of our own is needed.

use super::form::{handle_request, PortalReply};
use super::{PortalError, ProvisioningEndpoint};
use crate::config::NetworkIdentity;
use log::{info, warn};
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use tiny_http::{Header, Request, Response, Server};

/// Largest request body read from a client.
const MAX_BODY_LEN: u64 = 1024;

/// Requests handled per service call.
const MAX_REQUESTS_PER_SERVICE: usize = 4;

/// Provisioning portal backed by `tiny_http`.
#[derive(Default)]
pub struct PortalServer {
    server: Option<Server>,
    /// Accepted submission waiting for [`ProvisioningEndpoint::acknowledge`].
    awaiting: Option<Request>,
}

impl PortalServer {
    /// Create a stopped portal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(|s| s.server_addr().to_ip())
    }

    /// Route one request. A valid submission is returned unanswered along
    /// with its identity; everything else is answered here.
    fn route(mut request: Request) -> Option<(Request, NetworkIdentity)> {
        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.as_str().to_string());

        let mut body = Vec::new();
        if let Err(e) = request
            .as_reader()
            .take(MAX_BODY_LEN)
            .read_to_end(&mut body)
        {
            warn!("Failed to read portal request body: {}", e);
        }

        let reply = handle_request(request.method(), request.url(), content_type.as_deref(), &body);
        match reply.identity {
            Some(identity) => {
                info!("Portal {} {} -> pending store", request.method(), request.url());
                Some((request, identity))
            }
            None => {
                Self::send(request, reply);
                None
            }
        }
    }

    fn send(request: Request, reply: PortalReply) {
        info!("Portal {} {} -> {}", request.method(), request.url(), reply.status);
        let mut response = Response::from_string(reply.body).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
            response = response.with_header(header);
        }
        if let Err(e) = request.respond(response) {
            warn!("Failed to send portal response: {}", e);
        }
    }
}

impl ProvisioningEndpoint for PortalServer {
    fn start(&mut self, address: IpAddr, port: u16) -> Result<(), PortalError> {
        let addr = SocketAddr::new(address, port);
        let server = Server::http(addr).map_err(|e| PortalError::Bind(e.to_string()))?;
        info!("Provisioning portal listening on http://{}/", addr);
        self.server = Some(server);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.server.is_some()
    }

    fn service(&mut self) -> Option<NetworkIdentity> {
        if let Some(request) = self.awaiting.take() {
            warn!("Portal submission never acknowledged");
            Self::send(request, PortalReply::store_failed());
        }
        let server = self.server.as_ref()?;

        for _ in 0..MAX_REQUESTS_PER_SERVICE {
            match server.try_recv() {
                Ok(Some(request)) => {
                    if let Some((request, identity)) = Self::route(request) {
                        self.awaiting = Some(request);
                        return Some(identity);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Portal receive error: {}", e);
                    break;
                }
            }
        }
        None
    }

    fn acknowledge(&mut self, stored: bool) {
        let Some(request) = self.awaiting.take() else {
            return;
        };
        let reply = if stored {
            PortalReply::saved()
        } else {
            PortalReply::store_failed()
        };
        Self::send(request, reply);
    }
}
