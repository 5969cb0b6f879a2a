use thiserror;

pub type Result<T> = std::result::Result<T, TrimError>;

#[derive(thiserror::Error, Debug)]
pub enum TrimError {
    #[error("Hamming distance must be between equal length sequences, got window with length {window} and primer with length {primer}")]
    LengthMismatch { primer: usize, window: usize },

    #[error("Primer cannot be empty")]
    EmptyPrimer,

    #[error("Primer \"{primer}\" contains invalid character '{symbol}' (must be DNA/IUPAC alphabet)")]
    InvalidPrimer { primer: String, symbol: char },

    #[error("Window must be at least 1, got {0}")]
    InvalidWindow(usize),

    #[error("No primer named \"{name}\" in \"{file}\"")]
    PrimerNotFound { name: String, file: String },

    #[error("Error parsing fastq record: {0}")]
    Fastq(#[from] bio::io::fastq::Error),

    #[error("Error reading or writing bytes: {0}")]
    Io(#[from] std::io::Error),
}
