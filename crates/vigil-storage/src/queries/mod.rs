// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, one module per table or workflow.

pub mod channels;
pub mod incidents;
pub mod ingest;
pub mod jobs;
pub mod messages;
pub mod threads;
