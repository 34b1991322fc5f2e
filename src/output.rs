//! Result vector output formatting.

use crate::error::Result;
use std::io::Write;

/// Write the result vector as CSV.
///
/// Format:
/// ```csv
/// Index,Value
/// 0,0
/// 1,1
/// ```
pub fn write_vector_csv<W: Write>(values: &[i64], writer: &mut W) -> Result<()> {
    writeln!(writer, "Index,Value")?;
    for (i, v) in values.iter().enumerate() {
        writeln!(writer, "{},{}", i, v)?;
    }
    Ok(())
}

/// Write the elapsed-time line reported by the coordinating process.
pub fn write_elapsed<W: Write>(seconds: f64, writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", seconds)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_lists_every_element() {
        let mut out = Vec::new();
        write_vector_csv(&[5, -2], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Index,Value\n0,5\n1,-2\n");
    }

    #[test]
    fn elapsed_is_a_bare_number() {
        let mut out = Vec::new();
        write_elapsed(0.25, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0.25\n");
    }
}
