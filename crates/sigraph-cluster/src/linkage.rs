//! Average-linkage agglomerative clustering.
//!
//! The dendrogram is built with the nearest-neighbour chain algorithm over a
//! dense distance matrix, then cut by replaying merges in height order until
//! the requested number of clusters remains.

/// One dendrogram merge between the clusters of two input points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub a: usize,
    pub b: usize,
    pub height: f64,
}

/// Build the average-linkage dendrogram for `dist`, a symmetric `n x n`
/// matrix. Merges are returned in construction order, which is not
/// necessarily height order.
pub fn dendrogram(mut dist: Vec<Vec<f64>>) -> Vec<Merge> {
    let n = dist.len();
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    let mut chain: Vec<usize> = Vec::new();

    while merges.len() + 1 < n {
        if chain.is_empty() {
            match active.iter().position(|&a| a) {
                Some(first) => chain.push(first),
                None => break,
            }
        }

        let a = chain[chain.len() - 1];
        let prev = chain.len().checked_sub(2).map(|i| chain[i]);

        // The previous chain element wins ties so the chain always terminates.
        let (mut best, mut best_d) = match prev {
            Some(p) => (p, dist[a][p]),
            None => (usize::MAX, f64::INFINITY),
        };
        for c in (0..n).filter(|&c| active[c] && c != a) {
            if dist[a][c] < best_d {
                best = c;
                best_d = dist[a][c];
            }
        }

        if Some(best) != prev {
            chain.push(best);
            continue;
        }

        chain.truncate(chain.len() - 2);
        let (keep, drop) = (a.min(best), a.max(best));
        merges.push(Merge {
            a: keep,
            b: drop,
            height: best_d,
        });

        // Lance-Williams update for average linkage.
        let (sk, sd) = (size[keep] as f64, size[drop] as f64);
        for k in (0..n).filter(|&k| active[k] && k != keep && k != drop) {
            let d = (sk * dist[keep][k] + sd * dist[drop][k]) / (sk + sd);
            dist[keep][k] = d;
            dist[k][keep] = d;
        }
        size[keep] += size[drop];
        active[drop] = false;
    }

    merges
}

/// Cut the dendrogram into `k` flat clusters.
///
/// Labels are numbered by the first point that carries them.
pub fn cut(n: usize, merges: &[Merge], k: usize) -> Vec<usize> {
    let mut sorted = merges.to_vec();
    sorted.sort_by(|x, y| x.height.total_cmp(&y.height));

    let mut parent: Vec<usize> = (0..n).collect();
    for m in sorted.iter().take(n.saturating_sub(k)) {
        let (ra, rb) = (find(&mut parent, m.a), find(&mut parent, m.b));
        if ra != rb {
            parent[rb] = ra;
        }
    }

    let mut label_of_root: Vec<Option<usize>> = vec![None; n];
    let mut next = 0;
    (0..n)
        .map(|i| {
            let root = find(&mut parent, i);
            *label_of_root[root].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[f64]) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|a| points.iter().map(|b| (a - b).abs()).collect())
            .collect()
    }

    #[test]
    fn merges_closest_pair_first() {
        let merges = dendrogram(line(&[0.0, 10.0, 1.0]));
        assert_eq!(merges.len(), 2);
        let first = merges
            .iter()
            .min_by(|x, y| x.height.total_cmp(&y.height))
            .unwrap();
        assert_eq!((first.a, first.b), (0, 2));
        assert_eq!(first.height, 1.0);
    }

    #[test]
    fn average_linkage_height() {
        // {0,1} merge at 1; 10 joins at mean(10, 9) = 9.5
        let merges = dendrogram(line(&[0.0, 1.0, 10.0]));
        let mut heights: Vec<f64> = merges.iter().map(|m| m.height).collect();
        heights.sort_by(f64::total_cmp);
        assert_eq!(heights, [1.0, 9.5]);
    }

    #[test]
    fn cut_into_two_groups() {
        let points = [0.0, 0.5, 20.0, 1.0, 21.0];
        let merges = dendrogram(line(&points));
        assert_eq!(cut(points.len(), &merges, 2), [0, 0, 1, 0, 1]);
    }

    #[test]
    fn cut_extremes() {
        let points = [3.0, 1.0, 2.0];
        let merges = dendrogram(line(&points));
        assert_eq!(cut(3, &merges, 3), [0, 1, 2]);
        assert_eq!(cut(3, &merges, 1), [0, 0, 0]);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(dendrogram(vec![]).is_empty());
        assert!(dendrogram(vec![vec![0.0]]).is_empty());
        assert_eq!(cut(1, &[], 1), [0]);
    }
}
