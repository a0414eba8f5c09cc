//! Text → IPA through the `libespeak-ng` C API (`en-us` voice).
//!
//! Produces the same phonemes as `espeak-ng --ipa -q -v en-us`.  Linking is
//! done by `build.rs` when the `espeak` feature is on.
//!
//! espeak-ng keeps global state and is not thread-safe, so every call goes
//! through one process-wide lock.

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_int, c_void},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;

extern "C" {
    /// `NULL` selects the compiled-in data directory.
    fn espeak_ng_InitializePath(path: *const c_char);
    /// Returns 0 (ENS_OK) on success.
    fn espeak_ng_Initialize(context: *mut c_void) -> c_int;
    /// Returns 0 (EE_OK) on success.
    fn espeak_ng_SetVoiceByName(name: *const c_char) -> c_int;
    /// Translates one clause and advances `textptr` (set to `NULL` at the end).
    /// The returned buffer is overwritten by the next call.
    fn espeak_TextToPhonemes(
        textptr: *mut *const c_void,
        textmode: c_int,
        phonememode: c_int,
    ) -> *const c_char;
}

const CHARS_UTF8: c_int = 1;
const PHONEMES_IPA: c_int = 0x02;

static LOCK: Mutex<()> = Mutex::new(());
static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();
static DATA_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Point espeak-ng at a specific `espeak-ng-data` directory.
///
/// Must be called before the first [`phonemize`]; later calls are ignored.
pub fn set_data_path(path: &Path) {
    let _ = DATA_PATH.set(path.to_path_buf());
}

fn init() -> std::result::Result<(), String> {
    let path = DATA_PATH
        .get()
        .map(|p| CString::new(p.to_string_lossy().as_bytes()))
        .transpose()
        .map_err(|_| "espeak data path contains a null byte".to_string())?;
    let voice = CString::new("en-us").map_err(|e| e.to_string())?;

    unsafe {
        espeak_ng_InitializePath(path.as_ref().map_or(std::ptr::null(), |c| c.as_ptr()));

        let status = espeak_ng_Initialize(std::ptr::null_mut());
        if status != 0 {
            return Err(format!("espeak_ng_Initialize failed (status {:#010x})", status));
        }
        let rc = espeak_ng_SetVoiceByName(voice.as_ptr());
        if rc != 0 {
            return Err(format!("espeak_ng_SetVoiceByName(\"en-us\") failed (rc {})", rc));
        }
    }
    Ok(())
}

/// Initialise espeak-ng now and report whether it worked.
pub fn ensure_ready() -> Result<()> {
    let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
    INIT.get_or_init(init).clone().map_err(|e| anyhow!("espeak-ng: {}", e))
}

/// Convert `text` to IPA phonemes, clauses joined by single spaces.
pub fn phonemize(text: &str) -> Result<String> {
    let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
    INIT.get_or_init(init)
        .as_ref()
        .map_err(|e| anyhow!("espeak-ng: {}", e))?;

    let input = CString::new(text).map_err(|_| anyhow!("text contains a null byte"))?;
    let mut cursor: *const c_void = input.as_ptr() as *const c_void;
    let mut clauses = Vec::new();

    while !cursor.is_null() {
        let out = unsafe { espeak_TextToPhonemes(&mut cursor, CHARS_UTF8, PHONEMES_IPA) };
        if out.is_null() {
            continue;
        }
        let clause = unsafe { CStr::from_ptr(out) }
            .to_str()
            .map_err(|_| anyhow!("espeak-ng returned non-UTF-8 phonemes"))?
            .trim();
        if !clause.is_empty() {
            clauses.push(clause.to_owned());
        }
    }
    Ok(clauses.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready() {
        ensure_ready().expect("espeak-ng linked but failed to initialise");
    }

    #[test]
    fn test_phonemize_hello() {
        let ipa = phonemize("Hello world").unwrap();
        assert!(!ipa.is_empty());
        assert!(ipa.contains('w'), "unexpected IPA: {ipa}");
    }

    #[test]
    fn test_phonemize_empty() {
        assert!(phonemize("").unwrap().trim().is_empty());
    }
}
