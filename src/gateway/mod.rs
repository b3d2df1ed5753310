//! Calling-bridge integration: the request/acceptance types and the HTTP
//! client that forwards call initiations to the external service.

mod client;

pub use client::{CallAcceptance, CallGateway, CallRequest, HttpCallGateway, TENANT_HEADER};
