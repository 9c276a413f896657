use log::trace;
use ndarray::{arr1, ArrayD, ArrayView2, Axis, Ix2, IxDyn, Zip};
use symdiff_core::{
    error::SymdiffError,
    node::{Id, Node, Op},
    runtime::RuntimeBackend,
    shape::Shape,
};

fn unary(x: &ArrayD<f32>, op: impl Fn(f32) -> f32 + Sync + Send) -> ArrayD<f32> {
    let mut res = x.to_owned();
    #[cfg(not(feature = "rayon"))]
    {
        res.mapv_inplace(op);
    }
    #[cfg(feature = "rayon")]
    {
        res.par_mapv_inplace(op);
    }
    res
}

fn binary(
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
    op: impl Fn(f32, f32) -> f32 + Sync + Send,
) -> Result<ArrayD<f32>, SymdiffError> {
    let shape = shape_of(x).broadcast(&shape_of(y))?;
    let mut res = ArrayD::zeros(IxDyn(shape.dims()));
    let zip = Zip::from(&mut res).and_broadcast(x).and_broadcast(y);
    #[cfg(not(feature = "rayon"))]
    {
        zip.for_each(|v, &x, &y| *v = op(x, y));
    }
    #[cfg(feature = "rayon")]
    {
        zip.par_for_each(|v, &x, &y| *v = op(x, y));
    }
    Ok(res)
}

// Constants broadcast as shape (1,)
fn at_least_rank_1(x: ArrayD<f32>) -> ArrayD<f32> {
    if x.ndim() == 0 {
        x.insert_axis(Axis(0))
    } else {
        x
    }
}

fn matrix(x: &ArrayD<f32>, transpose: bool) -> Result<ArrayView2<'_, f32>, SymdiffError> {
    let x = x.view().into_dimensionality::<Ix2>().map_err(|_| {
        SymdiffError::shape_error(format!(
            "matrix multiply requires rank 2 operands, got {}",
            shape_of(x)
        ))
    })?;
    Ok(if transpose { x.reversed_axes() } else { x })
}

fn shape_of(x: &ArrayD<f32>) -> Shape {
    Shape::from(x.shape())
}

/// Interpreter evaluating nodes one by one with ndarray.
///
/// Interpreter keeps no per-node state, so one device can be shared
/// by any number of executors. Every evaluated value is checked against
/// the shape executor inferred for it.
#[derive(Debug, Default)]
pub struct Interpreter;

impl Interpreter {
    pub(crate) const fn new() -> Self {
        Self
    }

    fn forward(&self, node: &Node, p: &[&ArrayD<f32>]) -> Result<ArrayD<f32>, SymdiffError> {
        Ok(match *node.op() {
            Op::Placeholder => {
                return Err(SymdiffError::backend_error(format!(
                    "placeholder {} must be bound, it can not be evaluated",
                    node.label()
                )))
            }
            Op::Add(..) => binary(p[0], p[1], |x, y| x + y)?,
            Op::AddConst(_, k) => at_least_rank_1(unary(p[0], move |x| x + k)),
            Op::Mul(..) => binary(p[0], p[1], |x, y| x * y)?,
            Op::MulConst(_, k) => at_least_rank_1(unary(p[0], move |x| x * k)),
            Op::ZerosLike(..) => ArrayD::zeros(p[0].raw_dim()),
            Op::OnesLike(..) => ArrayD::ones(p[0].raw_dim()),
            Op::ReduceSumAxisZero(..) => match p[0].ndim() {
                0 => {
                    return Err(SymdiffError::shape_error(format!(
                        "can not sum over axis 0 of a rank 0 value, in node {}",
                        node.label()
                    )))
                }
                1 => arr1(&[p[0].sum()]).into_dyn(),
                _ => p[0].sum_axis(Axis(0)),
            },
            Op::BroadcastTo(..) => {
                let shape = shape_of(p[0]).broadcast(&shape_of(p[1]))?;
                p[0].broadcast(IxDyn(shape.dims()))
                    .ok_or_else(|| {
                        SymdiffError::shape_error(format!(
                            "{} can not be broadcasted to {shape}",
                            shape_of(p[0])
                        ))
                    })?
                    .to_owned()
            }
            Op::MatMul {
                transpose_a,
                transpose_b,
                ..
            } => {
                let a = matrix(p[0], transpose_a)?;
                let b = matrix(p[1], transpose_b)?;
                if a.ncols() != b.nrows() {
                    return Err(SymdiffError::shape_error(format!(
                        "matrix multiply inner dimensions differ, {} (transposed: {transpose_a}) and {} (transposed: {transpose_b})",
                        shape_of(p[0]),
                        shape_of(p[1]),
                    )));
                }
                a.dot(&b).into_dyn()
            }
            Op::ReLU(..) => unary(p[0], |x| x.max(0.)),
            Op::ReLUGrad(..) => binary(p[0], p[1], |x, g| if x > 0. { g } else { 0. })?,
        })
    }
}

impl RuntimeBackend for Interpreter {
    type Buffer = ArrayD<f32>;

    fn shape(&self, x: &ArrayD<f32>) -> Shape {
        shape_of(x)
    }

    fn compile(&mut self, nid: Id, node: &Node, shape: &Shape) -> Result<(), SymdiffError> {
        trace!("Compiling kernel {nid} {} -> {shape}", node.op().name());
        Ok(())
    }

    fn evaluate(
        &mut self,
        nid: Id,
        node: &Node,
        parameters: &[&ArrayD<f32>],
        shape: Option<&Shape>,
    ) -> Result<ArrayD<f32>, SymdiffError> {
        let op = node.op();
        if parameters.len() != op.arity() {
            return Err(SymdiffError::ArityError {
                op: op.name(),
                expected: op.arity(),
                found: parameters.len(),
            });
        }
        let res = self.forward(node, parameters)?;
        if let Some(shape) = shape {
            if res.shape() != shape.dims() {
                return Err(SymdiffError::backend_error(format!(
                    "kernel {nid} was inferred to have shape {shape}, but produced {}",
                    shape_of(&res)
                )));
            }
        }
        Ok(res)
    }
}
