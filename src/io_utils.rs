use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::*;

const GZ_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Output compression for trimmed reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compress {
    None,
    Gz,
    Zstd,
}

impl Compress {
    pub fn extension(&self) -> &'static str {
        match self {
            Compress::None => "fastq",
            Compress::Gz => "fastq.gz",
            Compress::Zstd => "fastq.zst",
        }
    }
}

/// Open `path` ('-' for stdin), transparently decompressing gzip or zstd input.
pub fn open_input(path: &str) -> Result<Box<dyn Read + Send>> {
    if path == "-" {
        sniff(BufReader::new(io::stdin()))
    } else {
        sniff(BufReader::new(File::open(path)?))
    }
}

fn sniff<R: BufRead + Send + 'static>(mut br: R) -> Result<Box<dyn Read + Send>> {
    let buf = br.fill_buf()?;
    let is_gz = buf.starts_with(&GZ_MAGIC);
    let is_zstd = buf.starts_with(&ZSTD_MAGIC);

    if is_gz {
        Ok(Box::new(MultiGzDecoder::new(br)))
    } else if is_zstd {
        Ok(Box::new(zstd::stream::read::Decoder::with_buffer(br)?))
    } else {
        Ok(Box::new(br))
    }
}

/// Destination for trimmed reads. Must be [`finish`](Sink::finish)ed so that
/// compressed streams get their trailers.
pub enum Sink {
    Plain(Box<dyn Write + Send>),
    Gz(GzEncoder<Box<dyn Write + Send>>),
    Zstd(zstd::stream::write::Encoder<'static, Box<dyn Write + Send>>),
}

impl Sink {
    pub fn finish(self) -> Result<()> {
        let mut inner = match self {
            Sink::Plain(w) => w,
            Sink::Gz(e) => e.finish()?,
            Sink::Zstd(e) => e.finish()?,
        };
        inner.flush()?;
        Ok(())
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(e) => e.write(buf),
            Sink::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gz(e) => e.flush(),
            Sink::Zstd(e) => e.flush(),
        }
    }
}

/// Create `path` ('-' for stdout) for writing, compressed as requested.
pub fn open_output(path: &str, compress: Compress) -> Result<Sink> {
    let inner: Box<dyn Write + Send> = if path == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(File::create(path)?))
    };

    Ok(match compress {
        Compress::None => Sink::Plain(inner),
        Compress::Gz => Sink::Gz(GzEncoder::new(inner, Compression::default())),
        Compress::Zstd => Sink::Zstd(zstd::stream::write::Encoder::new(inner, 0)?),
    })
}

/// Output path for `input` inside directory `dir`: the input's file name with
/// any fastq/compression extension replaced by `.trimmed.<ext>`.
pub fn output_path_for(dir: &str, input: &str, compress: Compress) -> String {
    let name = Path::new(input)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stdin");

    let mut stem = name;
    for ext in [".gz", ".zst", ".fastq", ".fq"] {
        stem = stem.strip_suffix(ext).unwrap_or(stem);
    }

    Path::new(dir)
        .join(format!("{}.trimmed.{}", stem, compress.extension()))
        .to_string_lossy()
        .into_owned()
}

/// Sequence of the entry named `name` in a (possibly compressed) FASTA file.
pub fn read_primer_fasta(path: &str, name: &str) -> Result<Vec<u8>> {
    let reader = fasta::Reader::new(open_input(path)?);

    for record in reader.records() {
        let record = record?;
        if record.id() == name {
            return Ok(record.seq().to_vec());
        }
    }

    Err(TrimError::PrimerNotFound {
        name: name.to_owned(),
        file: path.to_owned(),
    })
}
