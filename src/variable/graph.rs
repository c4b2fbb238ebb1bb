use std::fs;
use std::rc::Rc;
use std::path::Path;
use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use serde::{ Serialize, Deserialize, de::DeserializeOwned };

use crate::{
  tensor::Tensor,
  scalar::Real,
  variable::{ Variable, Node, Op },
  error::{ Result, ShapeError },
};


/// Snapshot of a computation graph with defined inputs and outputs.
///
/// Can be used for recomputing the entire graph with new input data
/// or saving it to disc.

#[derive(Debug, Clone)]
pub struct Graph<T: Real> {
  pub inputs: Vec<Variable<T>>,
  pub outputs: Vec<Variable<T>>,
}

impl<T: Real> Graph<T> {
  pub fn new(inputs: &[Variable<T>], outputs: &[Variable<T>]) -> Self {
    Self {
      inputs: inputs.into(),
      outputs: outputs.into(),
    }
  }

  /// Overwrite the inputs with `inputs` and recompute every node in place.

  pub fn run(&self, inputs: &[&Tensor<T>]) -> Result<()> {
    if inputs.len() != self.inputs.len() {
      return Err(ShapeError::InputCount { expected: self.inputs.len(), actual: inputs.len() }.into())
    }
    for (input, data) in self.inputs.iter().zip(inputs) {
      if input.dims() != data.dims() {
        return Err(ShapeError::Mismatch {
          op: "assign",
          lhs: input.dims().to_vec(),
          rhs: data.dims().to_vec(),
        }.into())
      }
    }
    for (input, data) in self.inputs.iter().zip(inputs) {
      input.tensor().assign(data)?;
    }
    let history = self.history();
    debug!("recomputing {} graph nodes", history.len());
    for node in history {
      node.forward()?;
    }
    Ok(())
  }

  // Nodes are created after their inputs, so ascending ids are a valid order
  fn history(&self) -> Vec<Rc<Node<T>>> {
    self.outputs
      .iter()
      .chain(&self.inputs)
      .flat_map(|out| out.history() )
      .sorted_by_key(|node| node.id )
      .unique_by(|node| node.id )
      .collect()
  }
}

impl<T: Real + Serialize + DeserializeOwned> Graph<T> {
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let nodes = self.history().iter().map(|node| NodeDump {
      id: node.id,
      data: node.data.copied(),
      op: node.op.clone(),
      previous: node.previous.iter().map(|prev| prev.id ).collect(),
      tracks_gradient: node.tracks_gradient,
    }).collect();

    let map_variable = |variable: &Variable<T>| variable.id();

    let dump = GraphDump {
      nodes,
      inputs: self.inputs.iter().map(map_variable).collect(),
      outputs: self.outputs.iter().map(map_variable).collect(),
    };
    let bytes = postcard::to_allocvec(&dump)?;
    fs::write(path.as_ref(), bytes)?;
    debug!("saved graph with {} nodes to {}", dump.nodes.len(), path.as_ref().display());
    Ok(())
  }

  /// Load a saved graph. Its nodes receive fresh ids.

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let bytes = fs::read(path.as_ref())?;
    let dump: GraphDump<T> = postcard::from_bytes(&bytes)?;
    let mut nodes: HashMap<usize, Rc<Node<T>>> = HashMap::new();
    for node in dump.nodes {
      let arity = node.op.as_ref().map_or(0, |op| op.arity() );
      if arity != node.previous.len() || !node.data.fits_storage() {
        return Err(postcard::Error::DeserializeBadEncoding.into())
      }
      let previous = node.previous.iter()
        .map(|id| lookup(&nodes, *id) )
        .collect::<Result<_>>()?;
      let loaded = Node::new(node.data, node.op, previous, node.tracks_gradient);
      nodes.insert(node.id, Rc::new(loaded));
    }
    let map_variable = |id: usize| lookup(&nodes, id).map(Variable::from_node);
    Ok(Graph {
      inputs: dump.inputs.into_iter().map(map_variable).collect::<Result<_>>()?,
      outputs: dump.outputs.into_iter().map(map_variable).collect::<Result<_>>()?,
    })
  }
}

fn lookup<T: Real>(nodes: &HashMap<usize, Rc<Node<T>>>, id: usize) -> Result<Rc<Node<T>>> {
  nodes.get(&id).cloned().ok_or(postcard::Error::DeserializeBadEncoding.into())
}

#[derive(Serialize, Deserialize)]
struct NodeDump<T: Real> {
  id: usize,
  data: Tensor<T>,
  op: Option<Op<T>>,
  previous: Vec<usize>,
  tracks_gradient: bool,
}

#[derive(Serialize, Deserialize)]
struct GraphDump<T: Real> {
  nodes: Vec<NodeDump<T>>,
  inputs: Vec<usize>,
  outputs: Vec<usize>,
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    shape::Shape,
    error::Error,
    variable::mops::{ BinaryMops, Add },
  };

  fn model() -> (Variable<f64>, Variable<f64>, Variable<f64>) {
    let x = Tensor::vec(&[1.0, 2.0]).tracked();
    let w = Tensor::new(&[2,1], vec![3.0, -1.0]).unwrap().tracked();
    let y = x.unsqueeze(0).unwrap().mm(&w).unwrap().exp().sum();
    (x, w, y)
  }

  #[test]
  fn rerun() {
    let (x, _, y) = model();
    assert_eq!(y.item().unwrap(), 1.0f64.exp());
    let graph = Graph::new(&[x.clone()], &[y.clone()]);
    graph.run(&[&Tensor::vec(&[0.0, 0.0])]).unwrap();
    assert_eq!(y.item().unwrap(), 1.0);
    assert_eq!(x.to_vec(), vec![0.0, 0.0]);
  }

  #[test]
  fn rerun_checks_inputs() {
    let (x, _, y) = model();
    let graph = Graph::new(&[x.clone()], &[y.clone()]);
    assert!(matches!(graph.run(&[]), Err(Error::Shape(ShapeError::InputCount { .. }))));
    assert!(matches!(graph.run(&[&Tensor::zeros(&[3])]), Err(Error::Shape(ShapeError::Mismatch { .. }))));
    assert_eq!(x.to_vec(), vec![1.0, 2.0]);
  }

  #[test]
  fn save_and_load() {
    let (x, _, y) = model();
    let path = std::env::temp_dir().join(format!("tensorgrad-graph-{}.bin", std::process::id()));
    Graph::new(&[x.clone()], &[y.clone()]).save(&path).unwrap();

    let graph = Graph::<f64>::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let (input, output) = (&graph.inputs[0], &graph.outputs[0]);
    assert_ne!(input.id(), x.id());
    assert_eq!(output.item().unwrap(), y.item().unwrap());

    graph.run(&[&Tensor::vec(&[2.0, 1.0])]).unwrap();
    assert_eq!(output.item().unwrap(), 5.0f64.exp());
    assert_eq!(y.item().unwrap(), 1.0f64.exp());

    output.backward().unwrap();
    let w = output.leaves().into_iter().find(|leaf| leaf.dims() == &[2,1] ).unwrap();
    assert_eq!(w.grad().unwrap().to_vec(), vec![2.0 * 5.0f64.exp(), 5.0f64.exp()]);
  }

  #[test]
  fn save_unused_input() {
    let (x, w, _) = model();
    let path = std::env::temp_dir().join(format!("tensorgrad-unused-{}.bin", std::process::id()));
    Graph::new(&[x], &[w.sum()]).save(&path).unwrap();
    let graph = Graph::<f64>::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(graph.inputs[0].to_vec(), vec![1.0, 2.0]);
    assert_eq!(graph.outputs[0].item().unwrap(), 2.0);
  }

  fn load_dump(name: &str, dump: &GraphDump<f64>) -> Result<Graph<f64>> {
    let path = std::env::temp_dir().join(format!("tensorgrad-{name}-{}.bin", std::process::id()));
    std::fs::write(&path, postcard::to_allocvec(dump).unwrap()).unwrap();
    let graph = Graph::load(&path);
    std::fs::remove_file(&path).ok();
    graph
  }

  fn leaf(id: usize, data: Tensor<f64>) -> NodeDump<f64> {
    NodeDump { id, data, op: None, previous: vec![], tracks_gradient: true }
  }

  #[test]
  fn load_rejects_wrong_input_count() {
    let add = NodeDump {
      id: 1,
      data: Tensor::vec(&[2.0]),
      op: Some(Op::Binary(BinaryMops::Add(Add))),
      previous: vec![0],
      tracks_gradient: true,
    };
    let dump = GraphDump { nodes: vec![leaf(0, Tensor::vec(&[1.0])), add], inputs: vec![0], outputs: vec![1] };
    assert!(matches!(load_dump("arity", &dump), Err(Error::Serialization(_))));
  }

  #[test]
  fn load_rejects_short_buffer() {
    // Four elements declared, two stored
    let bytes = postcard::to_allocvec(&(Shape::new(&[4]), vec![1.0, 2.0])).unwrap();
    let data: Tensor<f64> = postcard::from_bytes(&bytes).unwrap();
    let dump = GraphDump { nodes: vec![leaf(0, data)], inputs: vec![0], outputs: vec![0] };
    assert!(matches!(load_dump("short", &dump), Err(Error::Serialization(_))));
  }

  #[test]
  fn load_missing_file() {
    let result = Graph::<f32>::load(std::env::temp_dir().join("tensorgrad-no-such-graph.bin"));
    assert!(matches!(result, Err(Error::Io(_))));
  }
}
