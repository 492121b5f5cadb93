// SPDX-License-Identifier: Apache-2.0

pub mod bookmark;
pub mod config;
pub mod error;
pub mod eve;
pub mod import;
pub mod reader;
pub mod sink;
