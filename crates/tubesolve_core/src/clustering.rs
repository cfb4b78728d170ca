use crate::tube::TubeVector;

/// Whether the intersection of two tubes is non-empty on every slice and gate.
pub fn overlaps(a: &TubeVector, b: &TubeVector) -> bool {
    !(a & b).is_empty()
}

/// One scan: every tube is merged into the first cluster it overlaps, or
/// opens a new cluster.
pub fn clustering_pass(tubes: Vec<TubeVector>) -> Vec<TubeVector> {
    let mut clusters: Vec<TubeVector> = Vec::with_capacity(tubes.len());
    for tube in tubes {
        match clusters.iter_mut().find(|c| overlaps(&tube, c)) {
            Some(cluster) => *cluster |= &tube,
            None => clusters.push(tube),
        }
    }
    clusters
}

/// Repeats [`clustering_pass`] until a pass no longer reduces the count.
pub fn cluster(mut tubes: Vec<TubeVector>) -> Vec<TubeVector> {
    while tubes.len() > 1 {
        let before = tubes.len();
        tubes = clustering_pass(tubes);
        if tubes.len() == before {
            break;
        }
    }
    tubes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    fn band(lb: f64, ub: f64) -> TubeVector {
        TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(lb, ub)])
    }

    #[test]
    fn overlapping_tubes_are_merged() {
        let clusters = cluster(vec![band(0.0, 1.0), band(5.0, 6.0), band(0.5, 2.0)]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], band(0.0, 2.0));
        assert_eq!(clusters[1], band(5.0, 6.0));
    }

    #[test]
    fn chains_need_several_passes() {
        // [0,1] and [2,3] only meet once [1,2] has joined the first cluster,
        // after [2,3] already opened its own.
        let first = clustering_pass(vec![band(0.0, 1.0), band(2.0, 3.0), band(1.0, 2.0)]);
        assert_eq!(first.len(), 2);
        let clusters = cluster(vec![band(0.0, 1.0), band(2.0, 3.0), band(1.0, 2.0)]);
        assert_eq!(clusters, vec![band(0.0, 3.0)]);
    }

    #[test]
    fn clustering_is_idempotent() {
        let tubes = vec![band(0.0, 1.0), band(3.0, 4.0), band(0.9, 1.5), band(10.0, 11.0)];
        let once = cluster(tubes);
        let twice = cluster(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn empty_and_single_lists_are_unchanged() {
        assert!(cluster(Vec::new()).is_empty());
        assert_eq!(cluster(vec![band(0.0, 1.0)]), vec![band(0.0, 1.0)]);
    }
}
