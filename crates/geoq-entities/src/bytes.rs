/// Units `bytes_to_human`/`bytes_in_unit` understand, in ascending
/// order of scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteUnit {
  Bytes,
  KiloBytes,
  MegaBytes,
  GigaBytes,
}

impl ByteUnit {
  pub fn factor(self) -> f64 {
    match self {
      ByteUnit::Bytes => 1.0,
      ByteUnit::KiloBytes => 1024.0,
      ByteUnit::MegaBytes => 1024.0 * 1024.0,
      ByteUnit::GigaBytes => 1024.0 * 1024.0 * 1024.0,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      ByteUnit::Bytes => "bytes",
      ByteUnit::KiloBytes => "kB",
      ByteUnit::MegaBytes => "MB",
      ByteUnit::GigaBytes => "GB",
    }
  }

  pub fn parse(label: &str) -> Option<Self> {
    match label.to_lowercase().as_str() {
      "bytes" | "b" => Some(ByteUnit::Bytes),
      "kb" => Some(ByteUnit::KiloBytes),
      "mb" => Some(ByteUnit::MegaBytes),
      "gb" => Some(ByteUnit::GigaBytes),
      _ => None,
    }
  }
}

/// Rounds to 2 decimal places. A strictly-positive value that would
/// round to `0.00` is bumped up to `0.01`; an exact zero stays `0.00`.
fn round_2dp(value: f64) -> f64 {
  let rounded = (value * 100.0).round() / 100.0;
  if value > 0.0 && rounded == 0.0 { 0.01 } else { rounded }
}

/// Converts a byte count into an explicitly requested unit.
pub fn bytes_in_unit(bytes: u64, unit: ByteUnit) -> f64 {
  round_2dp(bytes as f64 / unit.factor())
}

/// Converts a byte count into the largest unit under which the value
/// is still `<= 1024`, checked sequentially from bytes up to GB.
pub fn bytes_to_human(bytes: u64) -> (f64, ByteUnit) {
  let value = bytes as f64;
  if value > 1024.0 * 1024.0 * 1024.0 {
    (round_2dp(value / ByteUnit::GigaBytes.factor()), ByteUnit::GigaBytes)
  } else if value > 1024.0 * 1024.0 {
    (round_2dp(value / ByteUnit::MegaBytes.factor()), ByteUnit::MegaBytes)
  } else if value > 1024.0 {
    (round_2dp(value / ByteUnit::KiloBytes.factor()), ByteUnit::KiloBytes)
  } else {
    (round_2dp(value), ByteUnit::Bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_zero_stays_zero() {
    assert_eq!(bytes_in_unit(0, ByteUnit::Bytes), 0.0);
    let (value, unit) = bytes_to_human(0);
    assert_eq!(value, 0.0);
    assert_eq!(unit, ByteUnit::Bytes);
  }

  #[test]
  fn tiny_positive_value_rounds_up_to_one_hundredth() {
    // 1 byte expressed in GB rounds to far less than 0.01, but is > 0.
    assert_eq!(bytes_in_unit(1, ByteUnit::GigaBytes), 0.01);
  }

  #[test]
  fn auto_unit_picks_largest_unit_under_threshold() {
    let (value, unit) = bytes_to_human(1536);
    assert_eq!(unit, ByteUnit::KiloBytes);
    assert_eq!(value, 1.5);
  }

  #[test]
  fn value_in_unit_times_factor_recovers_bytes() {
    let bytes = 5 * 1024 * 1024;
    let (value, unit) = bytes_to_human(bytes as u64);
    let recovered = value * unit.factor();
    assert!((recovered - bytes as f64).abs() < bytes as f64 * 0.01);
  }
}
