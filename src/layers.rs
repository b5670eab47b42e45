/// Append-only storage for DP layers keyed by `(start, end, changes)`.
///
/// Layer `a` holds the best loss and split for every interval split into
/// `a + 1` legs. Layers are pushed only once completely filled and are never
/// rewritten or dropped, so a smaller leg count can always be answered from the
/// cache and a larger one only needs the missing layers. Cells that cannot be
/// split under the minimum leg length hold `f64::INFINITY` and no split. Layer
/// 0 is a single leg and stores no splits at all.
#[derive(Debug, Clone)]
pub struct LayerStack {
    n: usize,
    layers: Vec<Layer>,
}

#[derive(Debug, Clone)]
pub struct Layer {
    width: usize,
    pub(crate) loss: Vec<f64>,
    pub(crate) split: Vec<Option<usize>>,
}

impl Layer {
    /// Infeasible everywhere until filled.
    pub fn empty(n: usize) -> Self {
        Layer {
            width: n + 1,
            loss: vec![f64::INFINITY; n * (n + 1)],
            split: vec![None; n * (n + 1)],
        }
    }

    /// Single-leg layer: losses only, nothing to split.
    pub fn without_splits(n: usize) -> Self {
        Layer {
            width: n + 1,
            loss: vec![f64::INFINITY; n * (n + 1)],
            split: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn loss(&self, start: usize, end: usize) -> f64 {
        self.loss[start * self.width + end]
    }

    pub fn split(&self, start: usize, end: usize) -> Option<usize> {
        self.split.get(start * self.width + end).copied().flatten()
    }
}

impl LayerStack {
    pub fn new(n: usize) -> Self {
        LayerStack { n, layers: Vec::new() }
    }

    pub fn n_segments(&self) -> usize {
        self.n
    }

    /// Number of completed layers, i.e. the largest leg count answerable.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn push(&mut self, layer: Layer) {
        debug_assert_eq!(layer.width(), self.n + 1);
        self.layers.push(layer);
    }

    pub fn get(&self, changes: usize) -> Option<&Layer> {
        self.layers.get(changes)
    }

    pub fn last(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Loss of `[start, end)` with `changes` pace changes; infinite when not cached.
    pub fn loss(&self, start: usize, end: usize, changes: usize) -> f64 {
        self.layers
            .get(changes)
            .map(|layer| layer.loss(start, end))
            .unwrap_or(f64::INFINITY)
    }

    pub fn split(&self, start: usize, end: usize, changes: usize) -> Option<usize> {
        self.layers.get(changes).and_then(|layer| layer.split(start, end))
    }

    /// Number of table cells held across all layers.
    pub fn cell_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.loss.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncached_layers_read_as_infeasible() {
        let mut stack = LayerStack::new(4);
        assert!(stack.is_empty());
        assert_eq!(stack.loss(0, 4, 0), f64::INFINITY);
        assert_eq!(stack.split(0, 4, 1), None);

        let mut layer = Layer::empty(4);
        layer.loss[4] = 1.5;
        stack.push(layer);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.loss(0, 4, 0), 1.5);
        assert_eq!(stack.loss(0, 4, 1), f64::INFINITY);
        assert_eq!(stack.cell_count(), 20);
    }

    #[test]
    fn test_single_leg_layer_has_no_split_storage() {
        let layer = Layer::without_splits(5);
        assert!(layer.split.is_empty());
        assert_eq!(layer.loss.len(), 30);
        assert_eq!(layer.split(0, 5), None);
    }
}
