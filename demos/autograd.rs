// Walks through recording operations, back-propagating gradients and
// sharing storage with flat arrays. Run with RUST_LOG=debug to see the
// backward passes being logged.

use tensorgrad::{ Tensor, Variable, Graph };

fn main() -> tensorgrad::Result<()> {
  env_logger::init();

  // Operations on tracked variables get recorded
  let x = Tensor::<f64>::ones(&[2, 2]).tracked();
  let y = &x + 2.0;
  println!("y was created by {:?}", y.operation());

  let z = (&y * 3.0).mul(&y)?;
  let out = z.mean();
  println!("out = {}", out.item()?);

  out.backward()?;
  println!("d(out)/dx = {}", x.grad().unwrap_or_else(|| x.zeros_like() ));

  // Non-scalar results need an explicit upstream gradient
  let x = Tensor::randn(&[3]).tracked();
  let mut y = &x * 2.0;
  while y.norm().item()? < 1000.0 {
    y = &y * 2.0;
  }
  y.backward_with(&Tensor::vec(&[0.1, 1.0, 0.0001]))?;
  println!("vector-Jacobian product = {}", x.grad().unwrap_or_else(|| x.zeros_like() ));

  // Constants record nothing
  let c = Tensor::vec(&[1.0, 2.0]).constant();
  println!("constant result tracks gradients: {}", (&c * 2.0).tracks_gradient());

  // Fit y = 2x + 1 by gradient descent, re-running one recorded graph
  let input = Variable::new(&[4, 1], Some(vec![0.0, 1.0, 2.0, 3.0]), false)?;
  let target = Tensor::new(&[4, 1], vec![1.0, 3.0, 5.0, 7.0])?.constant();
  let w = Tensor::zeros(&[1, 1]).tracked();
  let b = Tensor::zeros(&[1]).tracked();
  let loss = input.mm(&w)?.add(&b)?.sub(&target)?.sqr().mean();
  let graph = Graph::new(&[], &[loss.clone()]);
  for step in 0..500 {
    loss.reset();
    loss.backward()?;
    for param in loss.leaves() {
      if let Some(grad) = param.grad() {
        param.tensor().sub_(&(&grad * 0.05))?;
      }
    }
    graph.run(&[])?;
    if step % 100 == 0 {
      println!("step {step}: loss {:.6}", loss.item()?);
    }
  }
  println!("w = {}, b = {}", w.item()?, b.item()?);

  // Contiguous tensors can be exposed as flat arrays sharing their storage
  let t = Tensor::<f32>::ones(&[5]);
  let array = t.to_array_view();
  array.map_inplace(|v| v + 1.0 );
  println!("tensor after writing through the array: {t}");

  Ok(())
}
