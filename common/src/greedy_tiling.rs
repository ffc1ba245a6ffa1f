//! Greedy String Tiling over token sequences.
//!
//! Repeatedly finds the longest common runs of unmarked tokens, marks them as
//! tiles and continues with what is left, until no run of at least the minimum
//! match length remains. Similarity is the share of both sequences covered by
//! tiles.

use crate::TokenMatch;

/// The tiles found between two token sequences and the similarity they add up to.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiling {
    pub similarity: f32,
    pub matches: Vec<TokenMatch>,
}

/// Tile two token strings against each other.
/// Tiles are reported in `a`/`b` orientation and sorted by their position in `a`.
#[must_use]
pub fn compare(a: &str, b: &str, minimum_match_length: usize) -> Tiling {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let matches = greedy_string_tiling(&a, &b, minimum_match_length);
    Tiling {
        similarity: similarity(a.len(), b.len(), &matches),
        matches,
    }
}

/// Find non-overlapping tiles of at least `minimum_match_length` tokens.
/// Ties between equally long runs go to the earliest position in `a`, then in `b`.
#[must_use]
pub fn greedy_string_tiling<T: PartialEq>(
    a: &[T],
    b: &[T],
    minimum_match_length: usize,
) -> Vec<TokenMatch> {
    let minimum_match_length = minimum_match_length.max(1);
    let mut marked_a = vec![false; a.len()];
    let mut marked_b = vec![false; b.len()];
    let mut tiles = Vec::new();

    loop {
        let mut longest = minimum_match_length;
        let mut candidates: Vec<TokenMatch> = Vec::new();

        for i in 0..a.len() {
            if marked_a[i] {
                continue;
            }
            for j in 0..b.len() {
                if marked_b[j] {
                    continue;
                }
                let mut length = 0;
                while i + length < a.len()
                    && j + length < b.len()
                    && !marked_a[i + length]
                    && !marked_b[j + length]
                    && a[i + length] == b[j + length]
                {
                    length += 1;
                }
                if length > longest {
                    longest = length;
                    candidates.clear();
                }
                if length == longest {
                    candidates.push(TokenMatch {
                        a_start: i,
                        b_start: j,
                        length,
                    });
                }
            }
        }

        if candidates.is_empty() {
            break;
        }

        for candidate in candidates {
            let range_a = candidate.a_start..candidate.a_start + candidate.length;
            let range_b = candidate.b_start..candidate.b_start + candidate.length;
            // an earlier candidate of this round may have taken part of it
            if marked_a[range_a.clone()].iter().any(|&m| m)
                || marked_b[range_b.clone()].iter().any(|&m| m)
            {
                continue;
            }
            marked_a[range_a].fill(true);
            marked_b[range_b].fill(true);
            tiles.push(candidate);
        }
    }

    tiles.sort_by_key(|t| (t.a_start, t.b_start));
    tiles
}

/// Share of both sequences covered by the tiles, from 0 to 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a_len: usize, b_len: usize, matches: &[TokenMatch]) -> f32 {
    let total = a_len + b_len;
    if total == 0 {
        return 0.0;
    }
    let tiled: usize = matches.iter().map(|m| m.length).sum();
    (2 * tiled) as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_identical_sequences() {
        let tiling = compare("abcdefgh", "abcdefgh", 3);
        assert_eq!(
            tiling.matches,
            vec![TokenMatch {
                a_start: 0,
                b_start: 0,
                length: 8
            }]
        );
        assert!((tiling.similarity - 1.0).abs() < f32::EPSILON);
    }

    #[test_log::test]
    fn test_disjoint_sequences() {
        let tiling = compare("abcdef", "uvwxyz", 1);
        assert!(tiling.matches.is_empty());
        assert!(tiling.similarity.abs() < f32::EPSILON);
    }

    #[test_log::test]
    fn test_reordered_blocks_are_found() {
        // two blocks swapped around
        let tiling = compare("abcdXYZW", "XYZWabcd", 4);
        assert_eq!(
            tiling.matches,
            vec![
                TokenMatch {
                    a_start: 0,
                    b_start: 4,
                    length: 4
                },
                TokenMatch {
                    a_start: 4,
                    b_start: 0,
                    length: 4
                },
            ]
        );
        assert!((tiling.similarity - 1.0).abs() < f32::EPSILON);
    }

    #[test_log::test]
    fn test_short_runs_are_ignored() {
        let tiling = compare("abQcdR", "abPcdS", 3);
        assert!(tiling.matches.is_empty());
        let tiling = compare("abQcdR", "abPcdS", 2);
        assert_eq!(tiling.matches.len(), 2);
    }

    #[test_log::test]
    fn test_partial_overlap_similarity() {
        // 4 shared tokens out of 6 + 6
        let tiling = compare("abcdEF", "abcdGH", 2);
        assert!((tiling.similarity - 8.0 / 12.0).abs() < 1e-6);
    }

    #[test_log::test]
    fn test_tiles_do_not_overlap() {
        let tiling = compare("aaaa", "aaaaaaaa", 2);
        let tiled: usize = tiling.matches.iter().map(|m| m.length).sum();
        assert_eq!(tiled, 4);
        assert!((tiling.similarity - 8.0 / 12.0).abs() < 1e-6);
    }

    #[test_log::test]
    fn test_empty_sequences() {
        let tiling = compare("", "", 1);
        assert!(tiling.matches.is_empty());
        assert!(tiling.similarity.abs() < f32::EPSILON);
    }
}
