use super::HistoryRecord;
use std::collections::HashMap;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// 序列长度达到该值时，出现过于频繁的字符不参与匹配起点
const AUTOJUNK_MIN_LEN: usize = 200;

/// 与候选标题相似的历史条目
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub id: String,
    pub title: String,
    pub similarity: f64,
}

/// 按记录顺序（最早的在前）返回第一个与 `candidate` 相似度不低于
/// `threshold` 的历史标题。
///
/// 候选标题为空、历史为空或历史标题为空时都不算匹配。
pub fn check_similarity(
    candidate: &str,
    record: &HistoryRecord,
    threshold: f64,
) -> Option<SimilarMatch> {
    if candidate.is_empty() || record.processed_metadata.is_empty() {
        return None;
    }

    let a: Vec<char> = candidate.chars().collect();
    record
        .processed_metadata
        .iter()
        .filter(|(_, meta)| !meta.title.is_empty())
        .find_map(|(id, meta)| {
            let b: Vec<char> = meta.title.chars().collect();
            let similarity = ratio_chars(&a, &b);
            (similarity >= threshold).then(|| SimilarMatch {
                id: id.clone(),
                title: meta.title.clone(),
                similarity,
            })
        })
}

/// `2 * M / (len(a) + len(b))`，M 为最长匹配块递归分解得到的匹配字符总数
fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = Matcher::new(a, b).matched_len();
    2.0 * matched as f64 / total as f64
}

struct Matcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// b 中每个字符出现的位置（升序）
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> Matcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular);
        }

        Self { a, b, b2j }
    }

    /// 窗口内最长的公共块 `a[i..i+k] == b[j..j+k]`；
    /// 长度相同时取在 `a` 中（其次在 `b` 中）最靠前的
    fn find_longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_j2len.insert(j, k);
                    if k > best_len {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_len = k;
                    }
                }
            }
            j2len = next_j2len;
        }

        // 被剔除的高频字符仍可用于向两侧扩展
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_len += 1;
        }
        while best_i + best_len < ahi
            && best_j + best_len < bhi
            && self.a[best_i + best_len] == self.b[best_j + best_len]
        {
            best_len += 1;
        }

        (best_i, best_j, best_len)
    }

    fn matched_len(&self) -> usize {
        let mut total = 0;
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }

        total
    }
}
