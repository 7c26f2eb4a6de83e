use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Describes where a session's frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Local capture device by index (`0` is the default camera).
    Device(u32),
    /// Network stream such as `rtsp://` or `http://`.
    Url(String),
    /// Video or still-image file.
    File(PathBuf),
}

impl SourceSpec {
    /// Devices and network streams have no declared end.
    pub fn is_live(&self) -> bool {
        !matches!(self, SourceSpec::File(_))
    }
}

impl FromStr for SourceSpec {
    type Err = Infallible;

    /// All-digit strings are device indices, strings containing `://` are
    /// URLs, everything else is a file path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<u32>() {
                return Ok(SourceSpec::Device(index));
            }
        }
        if trimmed.contains("://") {
            return Ok(SourceSpec::Url(trimmed.to_string()));
        }
        Ok(SourceSpec::File(PathBuf::from(trimmed)))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "device {index}"),
            SourceSpec::Url(url) => write!(f, "{url}"),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}
