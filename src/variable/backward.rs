use std::rc::Rc;
use std::collections::{ HashMap, HashSet };

use log::{ debug, trace };

use crate::{
  tensor::Tensor,
  scalar::Real,
  variable::Node,
  error::{ Result, ShapeError, GradientError },
};


/// Every node reachable from `root`, inputs before the nodes consuming them.

pub(crate) fn topological_order<T: Real>(root: &Rc<Node<T>>) -> Vec<Rc<Node<T>>> {
  let mut order = vec![];
  let mut visited = HashSet::new();
  let mut stack = vec![(root.clone(), false)];
  while let Some((node, expanded)) = stack.pop() {
    if expanded {
      order.push(node);
      continue
    }
    if !visited.insert(node.id) { continue }
    stack.push((node.clone(), true));
    for prev in node.previous.iter().rev() {
      if !visited.contains(&prev.id) {
        stack.push((prev.clone(), false));
      }
    }
  }
  order
}

/// Propagate `grad` from `root` through its graph into the gradient
/// buffers of all tracking leaves.
///
/// Leaf buffers are only touched once every derivative rule has succeeded,
/// so a failing pass leaves all gradients as they were.

pub(crate) fn run<T: Real>(root: &Rc<Node<T>>, grad: Tensor<T>) -> Result<()> {
  if !root.tracks_gradient {
    return Err(GradientError::NotTracked { id: root.id }.into())
  }
  if grad.dims() != root.data.dims() {
    return Err(ShapeError::Upstream {
      expected: root.data.dims().to_vec(),
      got: grad.dims().to_vec(),
    }.into())
  }

  let order = topological_order(root);
  if let Some(node) = order.iter().find(|node| node.is_released() ) {
    return Err(GradientError::GraphReleased { id: node.id }.into())
  }
  debug!("backward pass from node {} over {} nodes", root.id, order.len());

  // Contributions received by each node during this pass
  let mut pending: HashMap<usize, Tensor<T>> = HashMap::new();
  pending.insert(root.id, grad);
  let mut leaves = vec![];

  for node in order.iter().rev() {
    let Some(grad) = pending.remove(&node.id) else { continue };
    if node.op.is_none() {
      leaves.push((node, grad));
      continue
    }
    trace!("node {} ({}) <- {:?}", node.id, node.op.as_ref().map_or("", |op| op.name() ), grad.dims());
    let changes = node.derive(&grad)?;
    for (prev, change) in node.previous.iter().zip(changes) {
      if !prev.tracks_gradient { continue }
      let summed = match pending.remove(&prev.id) {
        Some(sum) => sum.add(&change)?,
        None => change,
      };
      pending.insert(prev.id, summed);
    }
  }

  for (leaf, grad) in &leaves {
    if grad.dims() != leaf.data.dims() {
      return Err(ShapeError::Upstream {
        expected: leaf.data.dims().to_vec(),
        got: grad.dims().to_vec(),
      }.into())
    }
  }
  for (leaf, grad) in &leaves {
    trace!("leaf {} += {:?}", leaf.id, grad.dims());
    leaf.accumulate(grad)?;
  }
  debug!("accumulated gradients into {} leaves", leaves.len());
  Ok(())
}
