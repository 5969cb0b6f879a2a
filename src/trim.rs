//! Primer trimming at either edge of a read.
//!
//! Both trimmers are pull-based iterators over a record source. They hold on
//! to nothing but the record currently being scanned.

use std::ops::{AddAssign, Range};

use bio::io::fastq::Record;
use log::debug;

use crate::errors::*;
use crate::iupac::Primer;

/// Which edge of the read the primer is expected at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum End {
    /// Primer near the start; reads without it are dropped.
    Forward,
    /// Primer near the end; reads without it pass through untouched.
    Reverse,
}

impl End {
    pub fn name(&self) -> &'static str {
        match self {
            End::Forward => "forward",
            End::Reverse => "reverse",
        }
    }
}

/// Primer, window and tolerance, fixed for a whole run.
#[derive(Clone, Debug)]
pub struct TrimConfig {
    pub primer: Primer,
    pub window: usize,
    pub max_diffs: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Hit {
    offset: usize,
    diffs: usize,
}

impl TrimConfig {
    pub fn new(primer: Primer, window: usize, max_diffs: usize) -> Result<Self> {
        if window == 0 {
            return Err(TrimError::InvalidWindow(window));
        }

        Ok(Self {
            primer,
            window,
            max_diffs,
        })
    }

    /// Offsets count from the start of `seq`. The primer must leave at least
    /// one base after it to be considered at an offset.
    fn scan_leading(&self, seq: &[u8]) -> Result<Option<Hit>> {
        let pl = self.primer.len();
        best_hit(
            &self.primer,
            (0..self.window)
                .take_while(|&i| seq.len() > i + pl)
                .map(|i| (i, &seq[i..i + pl])),
        )
    }

    /// Offsets count back from the end of `seq`; offset 0 is the last `pl` bases.
    fn scan_trailing(&self, seq: &[u8]) -> Result<Option<Hit>> {
        let pl = self.primer.len();
        best_hit(
            &self.primer,
            (0..self.window)
                .take_while(|&i| seq.len() >= i + pl)
                .map(|i| (i, &seq[seq.len() - pl - i..seq.len() - i])),
        )
    }
}

/// First exact hit, or else the lowest-distance hit (earliest offset on ties).
/// `None` when no window was tried at all.
fn best_hit<'s>(
    primer: &Primer,
    windows: impl Iterator<Item = (usize, &'s [u8])>,
) -> Result<Option<Hit>> {
    let mut best: Option<Hit> = None;

    for (offset, window) in windows {
        let diffs = primer.distance(window)?;

        if diffs == 0 {
            return Ok(Some(Hit { offset, diffs }));
        }

        if best.map_or(true, |b| diffs < b.diffs) {
            best = Some(Hit { offset, diffs });
        }
    }

    Ok(best)
}

fn sub_record(record: &Record, range: Range<usize>) -> Record {
    Record::with_attrs(
        record.id(),
        record.desc(),
        &record.seq()[range.clone()],
        &record.qual()[range],
    )
}

/// Counters only; they never feed back into trimming decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimStats {
    pub reads_in: u64,
    pub reads_out: u64,
    pub exact: u64,
    pub fuzzy: u64,
    pub dropped: u64,
    pub untouched: u64,
}

impl TrimStats {
    pub fn trimmed(&self) -> u64 {
        self.exact + self.fuzzy
    }

    fn record_hit(&mut self, hit: Hit) {
        if hit.diffs == 0 {
            self.exact += 1;
        } else {
            self.fuzzy += 1;
        }
        self.reads_out += 1;
    }
}

impl AddAssign for TrimStats {
    fn add_assign(&mut self, other: Self) {
        self.reads_in += other.reads_in;
        self.reads_out += other.reads_out;
        self.exact += other.exact;
        self.fuzzy += other.fuzzy;
        self.dropped += other.dropped;
        self.untouched += other.untouched;
    }
}

/// Strict trimmer for primers at the start of reads.
///
/// Each call to `next` pulls records until one carries the primer within
/// `max_diffs` substitutions, and yields that read with the primer and
/// everything before it removed. Reads without an acceptable match are
/// discarded. The iterator ends when the source does.
pub struct LeadingTrimmer<'c, I> {
    config: &'c TrimConfig,
    records: I,
    stats: TrimStats,
}

impl<'c, I> LeadingTrimmer<'c, I> {
    pub fn new(config: &'c TrimConfig, records: I) -> Self {
        Self {
            config,
            records,
            stats: TrimStats::default(),
        }
    }

    pub fn stats(&self) -> TrimStats {
        self.stats
    }
}

impl<'c, I, E> Iterator for LeadingTrimmer<'c, I>
where
    I: Iterator<Item = std::result::Result<Record, E>>,
    E: Into<TrimError>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            self.stats.reads_in += 1;

            let hit = match self.config.scan_leading(record.seq()) {
                Ok(hit) => hit,
                Err(e) => return Some(Err(e)),
            };

            match hit {
                Some(hit) if hit.diffs <= self.config.max_diffs => {
                    debug!(
                        "{}: forward primer at offset {} with {} diffs",
                        record.id(),
                        hit.offset,
                        hit.diffs
                    );
                    self.stats.record_hit(hit);
                    let start = hit.offset + self.config.primer.len();
                    return Some(Ok(sub_record(&record, start..record.seq().len())));
                }
                _ => {
                    debug!("{}: no forward primer, dropping read", record.id());
                    self.stats.dropped += 1;
                }
            }
        }
    }
}

/// Lenient trimmer for primers at the end of reads.
///
/// Yields exactly one record per input record: trimmed before the primer when
/// it is found exactly, or with fewer than `max_diffs` substitutions, and
/// unchanged otherwise.
pub struct TrailingTrimmer<'c, I> {
    config: &'c TrimConfig,
    records: I,
    stats: TrimStats,
}

impl<'c, I> TrailingTrimmer<'c, I> {
    pub fn new(config: &'c TrimConfig, records: I) -> Self {
        Self {
            config,
            records,
            stats: TrimStats::default(),
        }
    }

    pub fn stats(&self) -> TrimStats {
        self.stats
    }
}

impl<'c, I, E> Iterator for TrailingTrimmer<'c, I>
where
    I: Iterator<Item = std::result::Result<Record, E>>,
    E: Into<TrimError>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        self.stats.reads_in += 1;

        let hit = match self.config.scan_trailing(record.seq()) {
            Ok(hit) => hit,
            Err(e) => return Some(Err(e)),
        };

        // non-exact hits must come in strictly under the tolerance here
        match hit {
            Some(hit) if hit.diffs == 0 || hit.diffs < self.config.max_diffs => {
                debug!(
                    "{}: reverse primer at offset {} with {} diffs",
                    record.id(),
                    hit.offset,
                    hit.diffs
                );
                self.stats.record_hit(hit);
                let end = record.seq().len() - self.config.primer.len() - hit.offset;
                Some(Ok(sub_record(&record, 0..end)))
            }
            _ => {
                debug!("{}: no reverse primer, keeping whole read", record.id());
                self.stats.untouched += 1;
                self.stats.reads_out += 1;
                Some(Ok(record))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(id: &str, seq: &[u8]) -> Record {
        let qual: Vec<u8> = (0..seq.len()).map(|i| b'!' + (i % 40) as u8).collect();
        Record::with_attrs(id, None, seq, &qual)
    }

    fn source(reads: Vec<Record>) -> std::vec::IntoIter<Result<Record>> {
        reads.into_iter().map(Ok).collect::<Vec<_>>().into_iter()
    }

    fn config(primer: &str, window: usize, max_diffs: usize) -> TrimConfig {
        TrimConfig::new(Primer::new(primer).unwrap(), window, max_diffs).unwrap()
    }

    #[test]
    fn zero_window_is_rejected() {
        let res = TrimConfig::new(Primer::new("AGT").unwrap(), 0, 1);
        assert!(matches!(res, Err(TrimError::InvalidWindow(0))));
    }

    #[test]
    fn leading_exact_match_trims_after_primer() {
        let cfg = config("AGT", 3, 1);
        let mut src = source(vec![read("r1", b"CCAGTTTTT"), read("r2", b"AGTAAAA")]);

        let mut trimmer = LeadingTrimmer::new(&cfg, &mut src);
        let out = trimmer.next().unwrap().unwrap();
        assert_eq!(out.id(), "r1");
        assert_eq!(out.seq(), b"TTTT");
        assert_eq!(out.qual(), &read("r1", b"CCAGTTTTT").qual()[5..]);
        assert_eq!(trimmer.stats().reads_in, 1);
        assert_eq!(trimmer.stats().exact, 1);
        drop(trimmer);

        // the second read was never pulled
        assert_eq!(src.len(), 1);
    }

    #[test]
    fn leading_discards_until_a_read_is_accepted() {
        let cfg = config("AGT", 2, 0);
        let mut src = source(vec![
            read("r1", b"CCCCCCCCC"),
            read("r2", b"AGTCCCCCC"),
            read("r3", b"AGTGGG"),
        ]);

        let mut trimmer = LeadingTrimmer::new(&cfg, &mut src);
        let out = trimmer.next().unwrap().unwrap();
        assert_eq!(out.id(), "r2");
        assert_eq!(out.seq(), b"CCCCCC");

        let stats = trimmer.stats();
        assert_eq!(stats.reads_in, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.reads_out, 1);
        drop(trimmer);
        assert_eq!(src.len(), 1);
    }

    #[test]
    fn leading_accepts_best_fuzzy_offset_within_tolerance() {
        let cfg = config("AGT", 3, 1);
        // offset 0 "CAC" = 3, offset 1 "ACT" = 1, offset 2 "CTA" = 3
        let out: Vec<_> = LeadingTrimmer::new(&cfg, source(vec![read("r1", b"CACTAGGG")]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seq(), b"AGGG");
    }

    #[test]
    fn leading_breaks_ties_on_earliest_offset() {
        let cfg = config("AGT", 4, 1);
        // offsets 0 and 3 both read "AGC" with one mismatch
        let out: Vec<_> = LeadingTrimmer::new(&cfg, source(vec![read("r1", b"AGCAGCCCC")]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out[0].seq(), b"AGCCCC");
    }

    #[test]
    fn leading_accepts_distance_equal_to_tolerance() {
        let cfg = config("AGT", 1, 1);
        let out: Vec<_> = LeadingTrimmer::new(&cfg, source(vec![read("r1", b"AGAC")]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out[0].seq(), b"C");
    }

    #[test]
    fn leading_judges_each_read_on_its_own() {
        let cfg = config("AGT", 3, 1);
        let reads = vec![
            // best is two mismatches at offset 0, dropped
            read("r1", b"ACCGGGGGG"),
            // best is one mismatch at offset 2
            read("r2", b"CCAGAGGGG"),
        ];
        let mut trimmer = LeadingTrimmer::new(&cfg, source(reads));
        let out = trimmer.next().unwrap().unwrap();
        assert_eq!(out.id(), "r2");
        assert_eq!(out.seq(), b"GGGG");
        assert!(trimmer.next().is_none());
        assert_eq!(trimmer.stats().fuzzy, 1);
        assert_eq!(trimmer.stats().dropped, 1);
    }

    #[test]
    fn leading_skips_offsets_where_primer_does_not_fit() {
        let cfg = config("AGT", 5, 0);
        // the primer must leave at least one base after it
        let reads = vec![read("short", b"AGT"), read("fits", b"CAGTA")];
        let out: Vec<_> = LeadingTrimmer::new(&cfg, source(reads))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "fits");
        assert_eq!(out[0].seq(), b"A");
    }

    #[test]
    fn leading_ends_with_the_source() {
        let cfg = config("AGT", 2, 0);
        let mut trimmer = LeadingTrimmer::new(&cfg, source(vec![read("r1", b"CCCCCC")]));
        assert!(trimmer.next().is_none());
        assert!(trimmer.next().is_none());
        assert_eq!(trimmer.stats().dropped, 1);
    }

    #[test]
    fn leading_trim_is_lossless() {
        let cfg = config("NGT", 4, 1);
        let original = read("r1", b"GGCGTACCTTGA");
        let out: Vec<_> = LeadingTrimmer::new(&cfg, source(vec![original.clone()]))
            .collect::<Result<_>>()
            .unwrap();

        let cut = original.seq().len() - out[0].seq().len();
        assert_eq!(cut, 5);
        assert_eq!([&original.seq()[..cut], out[0].seq()].concat(), original.seq());
        assert_eq!([&original.qual()[..cut], out[0].qual()].concat(), original.qual());
    }

    #[test]
    fn trailing_trim_is_lossless() {
        let cfg = config("TGCA", 4, 2);
        let original = read("r1", b"GGACTTGCATTA");
        let out: Vec<_> = TrailingTrimmer::new(&cfg, source(vec![original.clone()]))
            .collect::<Result<_>>()
            .unwrap();

        // primer ends three bases before the end, so seven bases go
        let kept = out[0].seq().len();
        assert_eq!(kept, 5);
        assert_eq!([out[0].seq(), &original.seq()[kept..]].concat(), original.seq());
        assert_eq!([out[0].qual(), &original.qual()[kept..]].concat(), original.qual());
    }

    #[test]
    fn trailing_lenient_fallback_trims_below_tolerance() {
        let cfg = config("TGCA", 2, 2);
        let out: Vec<_> = TrailingTrimmer::new(&cfg, source(vec![read("r1", b"AAAAATGCX")]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out[0].seq(), b"AAAAA");
        assert_eq!(out[0].qual(), &read("r1", b"AAAAATGCX").qual()[..5]);
    }

    #[test]
    fn trailing_keeps_read_when_distance_reaches_tolerance() {
        let cfg = config("TGCA", 2, 1);
        let original = read("r1", b"AAAAATGCX");
        let out: Vec<_> = TrailingTrimmer::new(&cfg, source(vec![original.clone()]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), original.id());
        assert_eq!(out[0].seq(), original.seq());
        assert_eq!(out[0].qual(), original.qual());
    }

    #[test]
    fn trailing_exact_match_trims_from_window_start() {
        let cfg = config("TGCA", 3, 0);
        let out: Vec<_> = TrailingTrimmer::new(&cfg, source(vec![read("r1", b"CCTGCAGG")]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out[0].seq(), b"CC");
    }

    #[test]
    fn trailing_yields_one_record_per_input() {
        let cfg = config("TGCA", 2, 2);
        let reads = vec![
            read("hit", b"AAAAATGCA"),
            read("miss", b"GGGGGGGGG"),
            read("short", b"GCA"),
            read("whole", b"TGCA"),
        ];
        let mut src = source(reads);
        let mut trimmer = TrailingTrimmer::new(&cfg, &mut src);

        let out = trimmer.next().unwrap().unwrap();
        assert_eq!(out.seq(), b"AAAAA");
        assert_eq!(trimmer.stats().reads_in, 1);

        let rest: Vec<_> = trimmer.by_ref().collect::<Result<_>>().unwrap();
        let seqs: Vec<&[u8]> = rest.iter().map(|r| r.seq()).collect();
        assert_eq!(seqs, vec![&b"GGGGGGGGG"[..], &b"GCA"[..], &b""[..]]);

        let stats = trimmer.stats();
        assert_eq!(stats.reads_in, 4);
        assert_eq!(stats.reads_out, 4);
        assert_eq!(stats.exact, 2);
        assert_eq!(stats.untouched, 2);
    }

    #[test]
    fn source_errors_are_passed_through() {
        let cfg = config("AGT", 2, 0);
        let reads: Vec<Result<Record>> = vec![
            Err(TrimError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated",
            ))),
            Ok(read("r1", b"AGTCC")),
        ];
        let mut trimmer = LeadingTrimmer::new(&cfg, reads.into_iter());
        assert!(matches!(trimmer.next(), Some(Err(TrimError::Io(_)))));
        assert_eq!(trimmer.next().unwrap().unwrap().seq(), b"CC");
    }

    #[test]
    fn stats_add_up() {
        let mut total = TrimStats {
            reads_in: 3,
            reads_out: 2,
            exact: 1,
            fuzzy: 1,
            dropped: 1,
            untouched: 0,
        };
        total += TrimStats {
            reads_in: 2,
            reads_out: 2,
            exact: 0,
            fuzzy: 1,
            dropped: 0,
            untouched: 1,
        };
        assert_eq!(total.reads_in, 5);
        assert_eq!(total.trimmed(), 3);
        assert_eq!(total.untouched, 1);
    }
}
