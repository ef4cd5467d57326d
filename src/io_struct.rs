use crate::stats::HostMap;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Quality handed to the Format stage when the caller leaves it unset or out of range.
pub const DEFAULT_OUTPUT_QUALITY: i64 = 90;

/// Serde adapter carrying image bytes as standard base64 strings.
pub mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterKind {
    Grayscale,
    Blur,
    Sharpen,
    EdgeDetect,
    Sepia,
    Negative,
    Brightness,
    Contrast,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Grayscale => "GRAYSCALE",
            FilterKind::Blur => "BLUR",
            FilterKind::Sharpen => "SHARPEN",
            FilterKind::EdgeDetect => "EDGE_DETECT",
            FilterKind::Sepia => "SEPIA",
            FilterKind::Negative => "NEGATIVE",
            FilterKind::Brightness => "BRIGHTNESS",
            FilterKind::Contrast => "CONTRAST",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl WatermarkPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkPosition::TopLeft => "top-left",
            WatermarkPosition::TopRight => "top-right",
            WatermarkPosition::BottomLeft => "bottom-left",
            WatermarkPosition::BottomRight => "bottom-right",
            WatermarkPosition::Center => "center",
        }
    }
}

impl FromStr for WatermarkPosition {
    type Err = String;

    /// An empty string selects the default position.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "" | "bottom-right" => Ok(WatermarkPosition::BottomRight),
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "center" => Ok(WatermarkPosition::Center),
            other => Err(format!("unknown watermark position: {other}")),
        }
    }
}

impl Serialize for WatermarkPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Unknown positions fall back to bottom-right.
impl<'de> Deserialize<'de> for WatermarkPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient_string(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|e| {
            log::warn!("{}, using bottom-right", e);
            WatermarkPosition::default()
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Webp => "WEBP",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "PNG" => Ok(OutputFormat::Png),
            "JPEG" | "JPG" => Ok(OutputFormat::Jpeg),
            "WEBP" => Ok(OutputFormat::Webp),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Unknown formats fall back to PNG.
impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient_string(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|e| {
            log::warn!("{}, using PNG", e);
            OutputFormat::default()
        }))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
    #[allow(dead_code)]
    Other(serde::de::IgnoredAny),
}

/// Reads a string option, treating null and non-string values as empty.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<RawValue>::deserialize(deserializer)? {
        Some(RawValue::Text(s)) => s,
        _ => String::new(),
    })
}

/// Reads any JSON number as an integer, saturating at the i64 bounds.
/// Null, non-finite and non-numeric values read as 0.
fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match Option::<RawValue>::deserialize(deserializer)? {
        Some(RawValue::Int(n)) => n,
        Some(RawValue::Float(n)) if n.is_finite() => n as i64,
        Some(RawValue::Text(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Negative sizes read as 0 ("unconstrained"); oversized ones clamp to `u32::MAX`.
fn lenient_dimension<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = lenient_int(deserializer)?;
    Ok(n.clamp(0, u32::MAX as i64) as u32)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// 0 leaves the axis unconstrained; both 0 skips the Resize stage.
    #[serde(deserialize_with = "lenient_dimension")]
    pub target_width: u32,
    #[serde(deserialize_with = "lenient_dimension")]
    pub target_height: u32,
    pub filters: Vec<FilterKind>,
    pub add_watermark: bool,
    pub watermark_text: String,
    pub watermark_position: WatermarkPosition,
    pub output_format: OutputFormat,
    #[serde(deserialize_with = "lenient_int")]
    pub output_quality: i64,
}

impl ProcessingOptions {
    /// Applies the boundary defaults once, so stage logic never sees raw caller values.
    pub fn normalized(mut self) -> Self {
        if !(1..=100).contains(&self.output_quality) {
            if self.output_quality != 0 {
                log::warn!(
                    "output quality {} out of range, using {}",
                    self.output_quality,
                    DEFAULT_OUTPUT_QUALITY
                );
            }
            self.output_quality = DEFAULT_OUTPUT_QUALITY;
        }
        self
    }

    pub fn resize_enabled(&self) -> bool {
        self.target_width > 0 || self.target_height > 0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(with = "base64_bytes", default)]
    pub image_data: Bytes,
    #[serde(default)]
    pub options: ProcessingOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingStats {
    pub original_size_bytes: u64,
    pub processed_size_bytes: u64,
    pub resize_time_ms: u64,
    pub filter_time_ms: u64,
    pub watermark_time_ms: u64,
    pub format_time_ms: u64,
    pub total_time_ms: u64,
    pub host_map: HostMap,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    pub process_id: String,
    #[serde(with = "base64_bytes", default)]
    pub processed_image: Bytes,
    pub stats: ProcessingStats,
}

impl ProcessResponse {
    pub fn completed(process_id: String, image: Bytes, stats: ProcessingStats) -> Self {
        ProcessResponse {
            success: true,
            message: "Processing completed successfully".to_string(),
            process_id,
            processed_image: image,
            stats,
        }
    }

    pub fn failed(process_id: String, message: String, stats: ProcessingStats) -> Self {
        ProcessResponse {
            success: false,
            message,
            process_id,
            processed_image: Bytes::new(),
            stats,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusInfo {
    pub process_id: String,
    pub status: String,
    pub progress_percent: u32,
    pub current_stage: String,
    pub stats: ProcessingStats,
}
