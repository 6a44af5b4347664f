/// Pluggable content-safety check run against every uploaded file before it
/// is durably recorded. Production deployments plug in a real scanner
/// (ClamAV, a vendor API); the default implementation only screens for
/// executable signatures.
pub trait ContentScanner: Send + Sync {
    fn scan(&self, filename: &str, data: &[u8]) -> Result<(), ScanError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("File '{filename}' rejected by content scan: {reason}")]
    Rejected { filename: String, reason: String },
}

/// Signature-based stub scanner. Rejects files that begin with known
/// executable magic bytes; everything else passes.
pub struct PatternScanner;

/// (signature, description) pairs checked against file headers.
const SUSPICIOUS_SIGNATURES: &[(&[u8], &str)] = &[
    (b"MZ", "Windows executable"),
    (&[0x7f, 0x45, 0x4c, 0x46], "ELF executable"),
];

impl ContentScanner for PatternScanner {
    fn scan(&self, filename: &str, data: &[u8]) -> Result<(), ScanError> {
        for (signature, description) in SUSPICIOUS_SIGNATURES {
            if data.starts_with(signature) {
                return Err(ScanError::Rejected {
                    filename: filename.to_string(),
                    reason: description.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_passes() {
        let scanner = PatternScanner;
        assert!(scanner.scan("rfp.pdf", b"%PDF-1.7 ...").is_ok());
    }

    #[test]
    fn test_csv_passes() {
        let scanner = PatternScanner;
        assert!(scanner.scan("budget.csv", b"year,amount\n2026,50000").is_ok());
    }

    #[test]
    fn test_pe_executable_rejected() {
        let scanner = PatternScanner;
        let err = scanner.scan("notmalware.pdf", b"MZ\x90\x00").unwrap_err();
        let ScanError::Rejected { filename, .. } = err;
        assert_eq!(filename, "notmalware.pdf");
    }

    #[test]
    fn test_elf_executable_rejected() {
        let scanner = PatternScanner;
        assert!(scanner
            .scan("data.csv", &[0x7f, 0x45, 0x4c, 0x46, 0x02])
            .is_err());
    }

    #[test]
    fn test_empty_file_passes_scan() {
        // Emptiness is a validation concern, not a safety concern.
        let scanner = PatternScanner;
        assert!(scanner.scan("empty.csv", b"").is_ok());
    }
}
