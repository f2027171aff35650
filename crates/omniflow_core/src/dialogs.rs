/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::path::PathBuf;

/// Opens the platform directory picker. Blocks the calling thread until the
/// user chooses a folder or cancels; returns `None` on cancel.
pub fn select_directory() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Select Save Directory")
        .pick_folder()
}
