// Copyright 2026 The Wicket Project
// SPDX-License-Identifier: Apache-2.0

pub mod auth;
pub mod config;
pub mod intercept;
pub mod message;
pub mod relay;
pub mod rewrite;
pub mod server;
pub mod tools;
pub mod upstream;
