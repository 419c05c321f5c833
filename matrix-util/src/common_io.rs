use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Field separator
#[derive(Clone, Debug, PartialEq)]
pub enum Delimiter {
    Str(Box<str>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.into())
    }
}

impl Delimiter {
    /// Separator as typed on a command line, where a tab usually
    /// arrives as the two characters `\` and `t`
    pub fn from_user_str(sep: &str) -> anyhow::Result<Self> {
        match sep {
            "" => Err(anyhow::anyhow!("empty separator")),
            "\\t" | "tab" => Ok(Delimiter::Str("\t".into())),
            "\\s" | "space" => Ok(Delimiter::Str(" ".into())),
            _ => Ok(Delimiter::Str(sep.into())),
        }
    }

    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Str(s) => line.split(&**s).collect(),
        }
    }
}

/// Every line of a plain or gzipped file
pub fn read_lines(file: &str) -> anyhow::Result<Vec<Box<str>>> {
    open_buf_reader(file)?
        .lines()
        .map(|line| Ok(line?.into_boxed_str()))
        .collect()
}

/// Write one line per item; `.gz` names are compressed and `stdout`
/// or `stderr` go to the terminal
pub fn write_lines<T: std::fmt::Display>(lines: &[T], file: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(file)?;
    for line in lines {
        match writeln!(buf, "{}", line) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(anyhow::anyhow!("failed to write {}: {}", file, e)),
        }
    }
    buf.flush()?;
    Ok(())
}

/// A delimited file split into trimmed fields
pub struct DelimitedLines {
    pub header: Vec<Box<str>>,
    pub rows: Vec<Vec<Box<str>>>,
}

/// Read a delimited file whose first data line is a header. Blank
/// lines and lines starting with `#` or `%` are skipped.
pub fn read_delimited_with_header(
    file: &str,
    delim: impl Into<Delimiter>,
) -> anyhow::Result<DelimitedLines> {
    let delim = delim.into();

    let mut data_lines = vec![];
    for line in open_buf_reader(file)?.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        let skip = line.trim().is_empty() || line.starts_with('#') || line.starts_with('%');
        if !skip {
            data_lines.push(line.to_string());
        }
    }

    let mut data_lines = data_lines.into_iter();
    let header_line = data_lines
        .next()
        .ok_or(anyhow::anyhow!("no header line in {}", file))?;

    let fields = |line: &str| -> Vec<Box<str>> {
        delim
            .split(line)
            .into_iter()
            .map(|w| w.trim().into())
            .collect()
    };

    let header = fields(&header_line);

    // indexed collect keeps the file order
    let rows = data_lines
        .collect::<Vec<_>>()
        .par_iter()
        .map(|line| fields(line))
        .collect();

    Ok(DelimitedLines { header, rows })
}

/// Buffered reader of a plain or gzipped (`.gz`) file
pub fn open_buf_reader(file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let handle =
        File::open(file).map_err(|e| anyhow::anyhow!("failed to open {}: {}", file, e))?;

    if Path::new(file).extension().is_some_and(|x| x == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(handle))))
    } else {
        Ok(Box::new(BufReader::new(handle)))
    }
}

/// Buffered writer of a plain or gzipped (`.gz`) file, or of
/// `stdout`/`stderr`
pub fn open_buf_writer(file: &str) -> anyhow::Result<Box<dyn Write>> {
    if file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    if file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let handle =
        File::create(file).map_err(|e| anyhow::anyhow!("failed to create {}: {}", file, e))?;

    if Path::new(file).extension().is_some_and(|x| x == "gz") {
        let encoder = GzEncoder::new(handle, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(handle)))
    }
}

/// Create a directory and its parents if needed
pub fn mkdir_all(dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("failed to create directory {}: {}", dir, e))
}

/// A fresh file name with `suffix` inside a new temporary directory
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let dir = tempfile::tempdir()?.path().to_path_buf();
    std::fs::create_dir_all(&dir)?;
    let file = tempfile::Builder::new().suffix(suffix).tempfile_in(&dir)?;
    Ok(file.path().to_path_buf())
}
