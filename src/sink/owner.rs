//! File owner lookup

use std::path::Path;
use tracing::debug;

/// Name of the user owning `path`
///
/// Falls back to the numeric uid when the user database has no entry.
/// Returns `None` if the file cannot be stat'ed or the platform has no
/// notion of owners.
pub fn owner_of(path: &Path) -> Option<String> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => owner_from_metadata(&metadata),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to get owner of file");
            None
        }
    }
}

#[cfg(unix)]
fn owner_from_metadata(metadata: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    let uid = metadata.uid();
    Some(user_name(uid).unwrap_or_else(|| uid.to_string()))
}

#[cfg(not(unix))]
fn owner_from_metadata(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}

/// Resolve a uid through the system user database
#[cfg(unix)]
fn user_name(uid: u32) -> Option<String> {
    use std::ffi::CStr;

    const MAX_BUF: usize = 1 << 16;

    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: passwd is plain old data; getpwuid_r fills it with pointers
        // into `buf`, which outlives every read below.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };

        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            let len = buf.len() * 2;
            buf.resize(len, 0);
            continue;
        }

        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            return None;
        }

        // SAFETY: pw_name is a NUL-terminated string inside `buf`
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_has_no_owner() {
        assert!(owner_of(Path::new("/definitely/not/here")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_of_own_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let owner = owner_of(file.path()).unwrap();
        assert!(!owner.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_root_uid_resolves() {
        assert_eq!(user_name(0).as_deref(), Some("root"));
    }
}
