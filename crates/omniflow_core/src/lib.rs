/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod dialogs;
pub mod proxy;
pub mod runtime;
pub mod store;

pub use omniflow_protocol as protocol;
