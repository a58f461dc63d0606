//! Blogers: a server-rendered community blog backed by a headless CMS.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
