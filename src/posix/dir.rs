/*!
 * Directory Enumeration
 * Lazy paginated cursor over the import backend's directory entry stream
 *
 * The backend hands out one page of names at a time, keyed by a running
 * entry offset. The cursor fetches a page only when the previous one is
 * exhausted and stops as soon as the backend reports an empty page or no
 * further pages. There is no rewind; restarting means a fresh `opendir`.
 */

use std::mem;

use log::debug;

use super::PosixShim;

/// Open-directory state. Created by `opendir`, advanced by `readdir`,
/// released by `closedir` (or drop).
#[derive(Debug)]
pub struct DirStream {
    path: String,
    /// Running offset into the backend's virtual entry stream
    offset: u64,
    /// Current page of names; entries already handed out are hollowed out
    entries: Vec<String>,
    /// Position in the current page; `None` means fetch before next entry
    index: Option<usize>,
    /// More pages might exist past the current one
    has_more: bool,
}

impl DirStream {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PosixShim {
    /// Open a directory cursor. No backend traffic happens here; the first
    /// `readdir` fetches the first page.
    pub fn opendir(&self, path: &str) -> DirStream {
        DirStream {
            path: path.to_string(),
            offset: 0,
            entries: Vec::new(),
            index: None,
            has_more: true,
        }
    }

    /// Next entry name, or `None` once the stream is exhausted. A backend
    /// failure mid-stream also ends the enumeration.
    pub fn readdir(&self, dir: &mut DirStream) -> Option<String> {
        let next = dir.index.map_or(0, |i| i + 1);
        let index = if next < dir.entries.len() {
            next
        } else {
            // Page exhausted: advance the stream offset past it and fetch
            dir.offset += dir.entries.len() as u64;
            dir.entries.clear();
            dir.index = None;
            if !dir.has_more {
                return None;
            }
            let page = match self.fs.list_dir(&dir.path, dir.offset) {
                Ok(page) => page,
                Err(error) => {
                    debug!("readdir({}): {}", dir.path, error);
                    return None;
                }
            };
            dir.has_more = page.has_more;
            if page.entries.is_empty() {
                return None;
            }
            dir.entries = page.entries;
            0
        };
        dir.index = Some(index);
        Some(mem::take(&mut dir.entries[index]))
    }

    /// Release the cursor: current page first, then the path
    pub fn closedir(&self, dir: DirStream) {
        drop(dir);
    }
}
