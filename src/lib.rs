//! Backend for the landing page: serves the static site and relays
//! contact form submissions to the site owner over SMTP.

pub mod config;
pub mod dto;
pub mod handler;
pub mod message;
pub mod models;
pub mod router;
pub mod service;
pub mod smtp;
pub mod transport;
