// Lexical URL features
//
// Slot positions are fixed: the trained scorer consumes them by index, so
// new features go at the end or not at all.

use crate::normalize::NormalizedUrl;
use regex::Regex;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

/// Length of the assembled vector handed to the scorer.
pub const FEATURE_COUNT: usize = 86;

/// Lexical slots, including the trailing CT placeholder.
pub const LEXICAL_SLOTS: usize = 80;

/// Zero-based index of slot 80, the certificate-transparency flag.
pub const CT_INDEX: usize = 79;

pub const EXECUTABLE_EXTENSIONS: [&str; 6] = [".exe", ".bat", ".cmd", ".scr", ".com", ".pif"];
pub const SENSITIVE_WORDS: [&str; 7] = [
    "login", "secure", "account", "update", "verify", "bank", "signin",
];

const VOWELS: &str = "aeiou";
const CONSONANTS: &str = "bcdfghjklmnpqrstvwxyz";
const URL_DELIMITERS: &str = "/:.*?=&-";

// Decimal digits plus the digit-typed numerals (superscripts, circled and
// parenthesized digits). Fractions and Roman numerals are not digits.
const DIGIT_CLASS: &str = concat!(
    r"\p{Nd}",
    r"\x{B2}\x{B3}\x{B9}\x{1369}-\x{1371}\x{19DA}",
    r"\x{2070}\x{2074}-\x{2079}\x{2080}-\x{2089}",
    r"\x{2460}-\x{2468}\x{2474}-\x{247C}\x{2488}-\x{2490}",
    r"\x{24EA}\x{24F5}-\x{24FD}\x{24FF}",
    r"\x{2776}-\x{277E}\x{2780}-\x{2788}\x{278A}-\x{2792}",
    r"\x{10A40}-\x{10A43}\x{10E60}-\x{10E68}\x{11052}-\x{1105A}",
    r"\x{1E8C7}-\x{1E8CF}\x{1F100}-\x{1F10A}",
);

static DIGIT_RUNS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!("[{DIGIT_CLASS}]+")).ok());

// Letters are the L* categories only; combining marks and letter-like
// numerals do not count
static LETTER_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\p{L}+").ok());

/// The fixed-length numeric input of the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub(crate) fn from_assembled(values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), FEATURE_COUNT);
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of a 1-based slot, as numbered in the feature layout. Slot 0
    /// and slots past the end are `None`.
    pub fn slot(&self, number: usize) -> Option<f64> {
        number.checked_sub(1).and_then(|i| self.0.get(i).copied())
    }
}

fn len(s: &str) -> f64 {
    s.chars().count() as f64
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn count(s: &str, pred: impl Fn(char) -> bool) -> f64 {
    s.chars().filter(|&c| pred(c)).count() as f64
}

fn run_lengths<'a>(runs: &'a Option<Regex>, s: &'a str) -> impl Iterator<Item = usize> + 'a {
    runs.iter()
        .flat_map(move |re| re.find_iter(s).map(|m| m.as_str().chars().count()))
}

fn digits(s: &str) -> f64 {
    run_lengths(&DIGIT_RUNS, s).sum::<usize>() as f64
}

fn longest_digit_run(s: &str) -> f64 {
    run_lengths(&DIGIT_RUNS, s).max().unwrap_or(0) as f64
}

fn letters(s: &str) -> f64 {
    run_lengths(&LETTER_RUNS, s).sum::<usize>() as f64
}

fn longest_repeat_run(s: &str) -> usize {
    let mut best = 0usize;
    let mut current = 0usize;
    let mut previous = None;
    for c in s.chars() {
        current = if previous == Some(c) { current + 1 } else { 1 };
        previous = Some(c);
        best = best.max(current);
    }
    best
}

fn max_len<'a>(items: impl IntoIterator<Item = &'a str>) -> f64 {
    items
        .into_iter()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0) as f64
}

fn mean_len(items: &[&str]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|s| len(s)).sum::<f64>() / items.len() as f64
}

/// Base-2 Shannon entropy over the character distribution of `s`.
pub fn shannon_entropy(s: &str) -> f64 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }

    // BTreeMap keeps the summation order, and therefore the bits, stable
    let mut frequencies: BTreeMap<char, usize> = BTreeMap::new();
    for c in s.chars() {
        *frequencies.entry(c).or_insert(0) += 1;
    }

    let total = total as f64;
    let entropy: f64 = frequencies
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            p * p.log2()
        })
        .sum();
    (-entropy).max(0.0)
}

/// Form-decoded query parameters, dropping pairs with empty values.
pub fn query_params(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// Last path component.
pub fn filename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Lower-cased extension of `filename` including its dot, or empty.
pub fn extension(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) => format!(".{}", filename[idx + 1..].to_lowercase()),
        None => String::new(),
    }
}

fn is_ipv4(host: &str) -> bool {
    host.parse::<Ipv4Addr>().is_ok()
}

/// Compute the 80 lexical slots for a normalized URL. Slot 80 is left at 0
/// for the assembler to fill in.
pub fn lexical_features(url: &NormalizedUrl) -> Vec<f64> {
    let full = url.full.as_str();
    let host = url.host.as_str();
    let path = url.path.as_str();
    let query = url.query.as_str();
    let fname = filename(path);
    let ext = extension(fname);
    let ext = ext.as_str();
    let lower_url = full.to_lowercase();

    let host_tokens: Vec<&str> = host.split('.').filter(|t| !t.is_empty()).collect();
    let path_tokens: Vec<&str> = path.split('/').filter(|t| !t.is_empty()).collect();
    let params = query_params(query);
    let values: Vec<&str> = params.values().flatten().map(String::as_str).collect();

    let (u, dm, pd, ql) = (len(full), len(host), len(path), len(query));
    let five = [full, host, path, fname, query];
    let six = [full, host, path, fname, ext, query];

    let mut feats: Vec<f64> = Vec::with_capacity(LEXICAL_SLOTS);

    // 1-9 structure and token lengths
    feats.push(params.len() as f64);
    feats.push(host_tokens.len() as f64);
    feats.push(path_tokens.len() as f64);
    feats.push(mean_len(&host_tokens));
    feats.push(max_len(host_tokens.iter().copied()));
    feats.push(mean_len(&path_tokens));
    feats.push(host_tokens.last().map(|t| len(t)).unwrap_or(0.0));
    feats.push(count(&lower_url, |c| VOWELS.contains(c)));
    feats.push(count(&lower_url, |c| CONSONANTS.contains(c)));

    // 10-19 digit runs, then digit counts
    feats.extend(five.iter().map(|s| longest_digit_run(s)));
    feats.extend(five.iter().map(|s| digits(s)));

    // 20-26 lengths
    feats.push(u);
    feats.push(dm);
    feats.push(pd);
    feats.push(path.rfind('/').map(|idx| len(&path[..idx])).unwrap_or(0.0));
    feats.push(len(fname));
    feats.push(len(ext));
    feats.push(ql);

    // 27-32 ratios
    feats.push(ratio(pd, u));
    feats.push(ratio(ql, u));
    feats.push(ratio(ql, dm));
    feats.push(ratio(dm, u));
    feats.push(ratio(pd, dm));
    feats.push(ratio(ql, pd));

    // 33-38 flags
    feats.push(EXECUTABLE_EXTENSIONS.contains(&ext) as u8 as f64);
    feats.push(host.contains(":80") as u8 as f64);
    feats.push(count(full, |c| c == '.'));
    feats.push(is_ipv4(host) as u8 as f64);
    feats.push(longest_repeat_run(full) as f64 / if u == 0.0 { 1.0 } else { u });
    feats.push(max_len(values.iter().copied()));

    // 39-50 digit and letter counts
    feats.extend(six.iter().map(|s| digits(s)));
    feats.extend(six.iter().map(|s| letters(s)));

    // 51-54 longest tokens
    let longest_path_token = max_len(path_tokens.iter().copied());
    feats.push(longest_path_token);
    feats.push(max_len(host_tokens.iter().copied()));
    feats.push(longest_path_token);
    feats.push(longest_path_token);

    // 55-58 query extremes, keywords, specials
    feats.push(max_len(
        params.keys().map(String::as_str).chain(values.iter().copied()),
    ));
    feats.push(SENSITIVE_WORDS.iter().any(|w| lower_url.contains(w)) as u8 as f64);
    feats.push(params.len() as f64);
    feats.push(count(full, |c| {
        !c.is_alphanumeric() && !URL_DELIMITERS.contains(c)
    }));

    // 59-61 delimiters
    let host_dots = count(host, |c| c == '.');
    let path_slashes = count(path, |c| c == '/');
    feats.push(host_dots);
    feats.push(path_slashes);
    feats.push(host_dots + path_slashes);

    // 62-67 digit rate
    feats.extend(six.iter().map(|s| {
        let n = len(s);
        digits(s) / if n == 0.0 { 1.0 } else { n }
    }));

    // 68-73 punctuation
    feats.extend(six.iter().map(|s| count(s, |c| c.is_ascii_punctuation())));

    // 74-79 entropy
    feats.extend(six.iter().map(|s| shannon_entropy(s)));

    // 80 CT placeholder
    feats.push(0.0);

    feats
}
