use std::fmt::Write;

/// 一条字幕
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// `HH:MM:SS,mmm`
pub fn format_timestamp(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
        milliseconds % 1000
    )
}

pub fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

fn parse_timestamp(timestamp: &str) -> Option<u64> {
    let (hms, millis) = timestamp.trim().split_once(',')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// 按给定顺序从 1 开始编号，块之间空一行
pub fn render(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text.trim()
        );
    }
    out
}

/// 宽松解析：序号可有可无，没有合法时间行的块直接丢弃
pub fn parse(content: &str) -> Vec<Cue> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).skip_while(|l| l.is_empty());
        let Some(first) = lines.next() else {
            continue;
        };
        let timing = if first.parse::<usize>().is_ok() {
            match lines.next() {
                Some(timing) => timing,
                None => continue,
            }
        } else {
            first
        };
        let Some((start, end)) = timing.split_once("-->") else {
            continue;
        };
        let (Some(start_ms), Some(end_ms)) = (parse_timestamp(start), parse_timestamp(end)) else {
            continue;
        };
        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(Cue {
            start_ms,
            end_ms,
            text,
        });
    }

    cues
}
