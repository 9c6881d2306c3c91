use std::fmt;
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::EtlError;
use crate::io::compression::{auto_detect_reader, auto_detect_writer};

/// Where a stream adapter reads from or writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    File(PathBuf),
    /// Read-only.
    #[cfg(feature = "io-http")]
    Http(String),
}

impl Resource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Resource::File(path.into())
    }

    #[cfg(feature = "io-http")]
    pub fn http(url: impl Into<String>) -> Self {
        Resource::Http(url.into())
    }

    /// Open for reading, decompressing transparently.
    pub fn open_read(&self) -> Result<Box<dyn Read>, EtlError> {
        let name = self.to_string();
        match self {
            Resource::File(path) => {
                let f = File::open(path).map_err(|e| EtlError::io(&name, e))?;
                auto_detect_reader(f, &name).map_err(|e| EtlError::io(&name, e))
            }
            #[cfg(feature = "io-http")]
            Resource::Http(url) => {
                let response = reqwest::blocking::get(url)
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| EtlError::io(&name, e))?;
                auto_detect_reader(response, &name).map_err(|e| EtlError::io(&name, e))
            }
        }
    }

    /// Create (or truncate) for writing; parent directories are created and
    /// the output is compressed when the extension names a codec.
    pub fn open_write(&self) -> Result<Box<dyn Write>, EtlError> {
        let name = self.to_string();
        match self {
            Resource::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    create_dir_all(parent).map_err(|e| EtlError::io(&name, e))?;
                }
                let f = File::create(path).map_err(|e| EtlError::io(&name, e))?;
                auto_detect_writer(f, &name).map_err(|e| EtlError::io(&name, e))
            }
            #[cfg(feature = "io-http")]
            Resource::Http(url) => Err(EtlError::Unsupported(format!("writing to {url}"))),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(path) => write!(f, "{}", path.display()),
            #[cfg(feature = "io-http")]
            Resource::Http(url) => f.write_str(url),
        }
    }
}

impl From<PathBuf> for Resource {
    fn from(path: PathBuf) -> Self {
        Resource::File(path)
    }
}

impl From<&std::path::Path> for Resource {
    fn from(path: &std::path::Path) -> Self {
        Resource::File(path.to_path_buf())
    }
}

/// Strings starting with `http://` or `https://` become HTTP resources when
/// the `io-http` feature is on; everything else is a file path.
impl From<&str> for Resource {
    fn from(s: &str) -> Self {
        #[cfg(feature = "io-http")]
        if s.starts_with("http://") || s.starts_with("https://") {
            return Resource::Http(s.to_string());
        }
        Resource::File(PathBuf::from(s))
    }
}
