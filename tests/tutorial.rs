use approx::assert_abs_diff_eq;

use tensorgrad::{ Tensor, Variable, Graph, Error, ShapeError, GradientError };


#[test]
fn gradient_of_mean() {
  let x = Tensor::<f64>::ones(&[2, 2]).tracked();
  let y = &x + 2.0;
  assert_eq!(y.operation(), Some("add_scalar"));
  assert!(x.is_leaf() && !y.is_leaf());

  let z = (&y * 3.0).mul(&y).unwrap();
  let out = z.mean();
  assert_eq!(z.tensor(), &Tensor::fill(&[2, 2], 27.0));
  assert_eq!(out.item().unwrap(), 27.0);

  out.backward().unwrap();
  assert_eq!(x.grad(), Some(Tensor::fill(&[2, 2], 4.5)));
}

#[test]
fn repeated_backward_accumulates() {
  let x = Tensor::<f64>::ones(&[2, 2]).tracked();
  let out = (&x + 2.0).sqr().mul_scalar(3.0).mean();
  out.backward().unwrap();
  out.backward().unwrap();
  assert_eq!(x.grad(), Some(Tensor::fill(&[2, 2], 9.0)));

  out.reset();
  out.backward().unwrap();
  assert_eq!(x.grad(), Some(Tensor::fill(&[2, 2], 4.5)));
}

#[test]
fn vector_jacobian_product() {
  let x = Tensor::vec(&[0.5, -1.0, 2.0]).tracked();
  let mut y = &x * 2.0;
  let mut doublings = 1;
  while y.norm().item().unwrap() < 1000.0 {
    y = &y * 2.0;
    doublings += 1;
  }
  let scale = 2.0f64.powi(doublings);
  assert_eq!(y.to_vec(), vec![0.5 * scale, -scale, 2.0 * scale]);

  let v = Tensor::vec(&[0.1, 1.0, 0.0001]);
  y.backward_with(&v).unwrap();
  let grad = x.grad().unwrap().to_vec();
  for (g, v) in grad.iter().zip(v.to_vec()) {
    assert_abs_diff_eq!(*g, v * scale, epsilon = 1e-9);
  }
}

#[test]
fn untracked_inputs() {
  let a = Tensor::<f32>::randn(&[3]).constant();
  let b = (&a * 2.0).exp().sum();
  assert!(!b.tracks_gradient());
  assert_eq!(b.operation(), None);
  assert!(matches!(b.backward(), Err(Error::Gradient(GradientError::NotTracked { .. }))));

  let x = Tensor::<f32>::randn(&[3]).tracked();
  let c = a.mul(&x).unwrap().sum();
  assert!(c.tracks_gradient());
  c.backward().unwrap();
  assert_eq!(x.grad().unwrap(), a.tensor().clone());
  assert_eq!(a.grad(), None);
}

#[test]
fn detached_copy() {
  let x = Tensor::vec(&[1.0, 2.0]).tracked();
  let y = x.detach();
  assert!(!y.tracks_gradient());
  assert_eq!(y.tensor(), x.tensor());
}

#[test]
fn mismatched_shapes() {
  let a = Tensor::<f64>::randn(&[5, 3]).tracked();
  let b = Tensor::<f64>::randn(&[5, 2]).tracked();
  assert!(matches!(a.add(&b), Err(Error::Shape(ShapeError::Mismatch { .. }))));
  assert!(matches!(a.tensor().add(b.tensor()), Err(Error::Shape(ShapeError::Mismatch { .. }))));
  assert!(matches!(a.mm(&a), Err(Error::Shape(ShapeError::InnerDims { .. }))));
}

#[test]
fn failing_pass_keeps_gradients() {
  let x = Tensor::vec(&[0.2, 0.7]).tracked();
  (&x * 2.0).sum().backward().unwrap();
  let before = x.grad().unwrap().to_vec();

  let y = x.round().add(&x).unwrap().sum();
  assert!(matches!(y.backward(), Err(Error::UnsupportedOperator { op: "round" })));
  assert_eq!(x.grad().unwrap().to_vec(), before);

  let z = x.exp().sum();
  z.release_graph();
  assert!(matches!(z.backward(), Err(Error::Gradient(GradientError::GraphReleased { .. }))));
  assert_eq!(x.grad().unwrap().to_vec(), before);
}

#[test]
fn in_place_through_shared_storage() {
  let a = Tensor::<f32>::ones(&[5]);
  let b = a.to_array_view();
  b.map_inplace(|v| v + 1.0 );
  assert_eq!(a.to_vec(), vec![2.0; 5]);

  let mut c = Tensor::from_array_view(&b);
  c += 1.0;
  assert_eq!(b.to_vec(), vec![3.0; 5]);
  assert_eq!(a.to_vec(), vec![3.0; 5]);

  let d = a.to_array_view_as::<f64>();
  assert!(!d.shares_storage());
}

#[test]
fn gradients_match_numeric() {
  let w = Tensor::<f64>::randn(&[3, 4]).constant();
  let error = Variable::check_gradients(&[2, 3], |x| {
    let hidden = x.mm(&w)?.sigmoid();
    Ok(hidden.mul(&hidden)?.mean_dim(0)?.add_scalar(1.0).log())
  }).unwrap();
  assert!(error < 1e-4);
}

#[test]
fn graph_round_trip() {
  let x = Tensor::vec(&[1.0f32, 2.0, 3.0]).tracked();
  let y = x.sqr().sum();
  let path = std::env::temp_dir().join(format!("tensorgrad-tutorial-{}.bin", std::process::id()));
  Graph::new(&[x], &[y]).save(&path).unwrap();

  let graph = Graph::<f32>::load(&path).unwrap();
  std::fs::remove_file(&path).ok();
  graph.run(&[&Tensor::vec(&[2.0, 0.0, 1.0])]).unwrap();
  assert_eq!(graph.outputs[0].item().unwrap(), 5.0);

  graph.outputs[0].backward().unwrap();
  assert_eq!(graph.inputs[0].grad(), Some(Tensor::vec(&[4.0, 0.0, 2.0])));
}
