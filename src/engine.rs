use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use crate::error::{Error, Result};

/// How a node was produced. The reverse pass dispatches on this tag to push
/// gradient into the node's producers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Operation {
    Input,
    Add,
    Multiply,
    Power(f64),
    Exp,
    Tanh,
    ReLU,
}

impl Operation {
    /// Short name used when rendering graphs.
    pub fn symbol(&self) -> String {
        match self {
            Operation::Input => "input".to_string(),
            Operation::Add => "+".to_string(),
            Operation::Multiply => "*".to_string(),
            Operation::Power(p) => format!("pow {}", p),
            Operation::Exp => "exp".to_string(),
            Operation::Tanh => "tanh".to_string(),
            Operation::ReLU => "relu".to_string(),
        }
    }

    /// Partial derivative of the output with respect to each producer, in
    /// producer order.
    fn local_gradients(&self, out_data: f64, producers: &[Value]) -> Vec<f64> {
        match (*self, producers) {
            (Operation::Input, _) => vec![],
            (Operation::Add, [_, _]) => vec![1.0, 1.0],
            (Operation::Multiply, [a, b]) => vec![b.data(), a.data()],
            (Operation::Power(p), [a]) => vec![p * a.data().powf(p - 1.0)],
            (Operation::Exp, [_]) => vec![out_data],
            (Operation::Tanh, [_]) => vec![1.0 - out_data * out_data],
            (Operation::ReLU, [a]) => vec![if a.data() > 0.0 { 1.0 } else { 0.0 }],
            (operation, producers) => unreachable!(
                "{:?} node built with {} producers",
                operation,
                producers.len()
            ),
        }
    }
}

struct InternalValueData {
    data: f64,
    grad: f64,
    operation: Operation,
    label: Option<String>,
    producers: Vec<Value>,
}

// Dropping the last handle to a deep graph would otherwise recurse once per
// level through `producers`.
impl Drop for InternalValueData {
    fn drop(&mut self) {
        let mut worklist = std::mem::take(&mut self.producers);
        while let Some(Value(node)) = worklist.pop() {
            if let Ok(cell) = Rc::try_unwrap(node) {
                let mut inner = cell.into_inner();
                worklist.append(&mut inner.producers);
            }
        }
    }
}

/// Handle to a scalar node in the computation graph.
///
/// Cloning the handle shares the node: gradients written through one clone are
/// visible through every other. A node's producers are fixed when it is built.
#[derive(Clone)]
pub struct Value(Rc<RefCell<InternalValueData>>);

impl Value {
    /// Creates a leaf node with zero gradient.
    pub fn new(data: f64) -> Value {
        Value::from_operation(data, Operation::Input, vec![])
    }

    fn from_operation(data: f64, operation: Operation, producers: Vec<Value>) -> Value {
        Value(Rc::new(RefCell::new(InternalValueData {
            data,
            grad: 0.0,
            operation,
            label: None,
            producers,
        })))
    }

    pub fn with_label(self, label: &str) -> Value {
        self.0.borrow_mut().label = Some(label.to_string());
        self
    }

    pub fn label(&self) -> Option<String> {
        self.0.borrow().label.clone()
    }

    /// Stable identity of the underlying node, shared by all clones of the handle.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn operation(&self) -> Operation {
        self.0.borrow().operation
    }

    pub fn data(&self) -> f64 {
        self.0.borrow().data
    }

    pub fn grad(&self) -> f64 {
        self.0.borrow().grad
    }

    /// The direct operands of the operation that created this node, in operand order.
    pub fn producers(&self) -> Vec<Value> {
        self.0.borrow().producers.clone()
    }

    pub fn is_leaf(&self) -> bool {
        self.0.borrow().producers.is_empty()
    }

    /// Overwrites the forward value. Meant for optimisers updating parameters;
    /// nodes already built from this one keep the value they were computed with.
    pub fn set_data(&self, data: f64) {
        self.0.borrow_mut().data = data;
    }

    pub fn decrement_data(&self, amount: f64) {
        self.0.borrow_mut().data -= amount;
    }

    pub fn set_grad(&self, grad: f64) {
        self.0.borrow_mut().grad = grad;
    }

    pub fn zero_grad(&self) {
        self.set_grad(0.0);
    }

    fn increment_grad(&self, grad: f64) {
        self.0.borrow_mut().grad += grad;
    }

    /// Every node reachable from this one, each exactly once, ordered so that a
    /// node comes after all of its producers. This node is last.
    pub fn topological_order(&self) -> Vec<Value> {
        let mut topo = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(self.clone(), false)];

        while let Some((v, expanded)) = stack.pop() {
            if expanded {
                topo.push(v);
                continue;
            }
            if !visited.insert(v.id()) {
                continue;
            }

            let producers = v.producers();
            stack.push((v, true));
            // Reversed so the first operand is explored first.
            for producer in producers.into_iter().rev() {
                if !visited.contains(&producer.id()) {
                    stack.push((producer, false));
                }
            }
        }

        topo
    }

    /// Runs the reverse pass with this node as the output.
    ///
    /// Sets this node's gradient to 1 and adds one pass worth of gradient into
    /// every node it depends on. Gradients are never reset: call `zero_grad` on
    /// the parameters between passes, otherwise a second call counts twice.
    ///
    /// Propagation uses only the gradient produced by this pass. A `grad` set
    /// by hand on an intermediate node is kept but not pushed to its producers.
    pub fn backward(&self) {
        let topo = self.topological_order();
        let position: HashMap<usize, usize> =
            topo.iter().enumerate().map(|(i, v)| (v.id(), i)).collect();

        // Contributions of this pass only, so earlier passes are not re-propagated.
        let mut pass = vec![0.0; topo.len()];
        if let Some(root) = pass.last_mut() {
            *root = 1.0;
        }

        self.set_grad(1.0);
        for (i, v) in topo.iter().enumerate().rev() {
            let node = v.0.borrow();
            let locals = node.operation.local_gradients(node.data, &node.producers);
            for (producer, local) in node.producers.iter().zip(locals) {
                let contribution = local * pass[i];
                pass[position[&producer.id()]] += contribution;
                producer.increment_grad(contribution);
            }
        }
    }

    /// `self ^ exponent`.
    ///
    /// # Panics
    ///
    /// Panics if the node is zero and the exponent is negative; see [`Value::checked_powf`].
    pub fn powf(&self, exponent: f64) -> Value {
        match self.checked_powf(exponent) {
            Ok(out) => out,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn powi(&self, exponent: i32) -> Value {
        self.powf(exponent as f64)
    }

    /// `self ^ exponent`, failing with [`Error::Domain`] when a zero node is
    /// raised to a negative power.
    pub fn checked_powf(&self, exponent: f64) -> Result<Value> {
        let a = self.data();
        if a == 0.0 && exponent < 0.0 {
            return Err(Error::Domain("zero-valued node raised to a negative power"));
        }

        Ok(Value::from_operation(
            a.powf(exponent),
            Operation::Power(exponent),
            vec![self.clone()],
        ))
    }

    /// `self / other`, failing with [`Error::Domain`] when `other` is zero.
    pub fn checked_div<T: Into<Value>>(&self, other: T) -> Result<Value> {
        let other = other.into();
        if other.data() == 0.0 {
            return Err(Error::Domain("division by a zero-valued node"));
        }

        Ok(multiply(self, &other.checked_powf(-1.0)?))
    }

    pub fn exp(&self) -> Value {
        Value::from_operation(self.data().exp(), Operation::Exp, vec![self.clone()])
    }

    pub fn tanh(&self) -> Value {
        let x = self.data();
        let e2x = (2.0 * x).exp();
        // The closed form overflows to NaN for large |x|.
        let t = if e2x.is_infinite() { 1.0 } else { (e2x - 1.0) / (e2x + 1.0) };

        Value::from_operation(t, Operation::Tanh, vec![self.clone()])
    }

    pub fn relu(&self) -> Value {
        let a = self.data();
        let c = if a > 0.0 { a } else { 0.0 };

        Value::from_operation(c, Operation::ReLU, vec![self.clone()])
    }
}

impl<T: Into<f64>> From<T> for Value {
    fn from(t: T) -> Value {
        Value::new(t.into())
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Value {
        value.clone()
    }
}

fn add(a: &Value, b: &Value) -> Value {
    Value::from_operation(a.data() + b.data(), Operation::Add, vec![a.clone(), b.clone()])
}

fn multiply(a: &Value, b: &Value) -> Value {
    Value::from_operation(
        a.data() * b.data(),
        Operation::Multiply,
        vec![a.clone(), b.clone()],
    )
}

fn negate(a: &Value) -> Value {
    multiply(a, &Value::new(-1.0))
}

fn subtract(a: &Value, b: &Value) -> Value {
    add(a, &negate(b))
}

fn divide(a: &Value, b: &Value) -> Value {
    match a.checked_div(b) {
        Ok(out) => out,
        Err(e) => panic!("{}", e),
    }
}

// Every combination of owned, borrowed and raw-number operands. Raw numbers
// become fresh leaves.
macro_rules! impl_binary_operation {
    ($trait:ident, $method:ident, $function:ident) => {
        impl $trait<Value> for Value {
            type Output = Value;

            fn $method(self, other: Value) -> Value {
                $function(&self, &other)
            }
        }

        impl<'a> $trait<&'a Value> for Value {
            type Output = Value;

            fn $method(self, other: &'a Value) -> Value {
                $function(&self, other)
            }
        }

        impl<'a> $trait<Value> for &'a Value {
            type Output = Value;

            fn $method(self, other: Value) -> Value {
                $function(self, &other)
            }
        }

        impl<'a, 'b> $trait<&'b Value> for &'a Value {
            type Output = Value;

            fn $method(self, other: &'b Value) -> Value {
                $function(self, other)
            }
        }

        impl $trait<f64> for Value {
            type Output = Value;

            fn $method(self, other: f64) -> Value {
                $function(&self, &Value::from(other))
            }
        }

        impl<'a> $trait<f64> for &'a Value {
            type Output = Value;

            fn $method(self, other: f64) -> Value {
                $function(self, &Value::from(other))
            }
        }

        impl $trait<Value> for f64 {
            type Output = Value;

            fn $method(self, other: Value) -> Value {
                $function(&Value::from(self), &other)
            }
        }

        impl<'a> $trait<&'a Value> for f64 {
            type Output = Value;

            fn $method(self, other: &'a Value) -> Value {
                $function(&Value::from(self), other)
            }
        }
    };
}

impl_binary_operation!(Add, add, add);
impl_binary_operation!(Sub, sub, subtract);
impl_binary_operation!(Mul, mul, multiply);
impl_binary_operation!(Div, div, divide);

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Value {
        negate(&self)
    }
}

impl<'a> Neg for &'a Value {
    type Output = Value;

    fn neg(self) -> Value {
        negate(self)
    }
}

/// Left fold with `+`. Summing nothing gives a zero leaf.
impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(mut iter: I) -> Value {
        match iter.next() {
            Some(first) => iter.fold(first, |acc, x| add(&acc, &x)),
            None => Value::new(0.0),
        }
    }
}

impl<'a> Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Value {
        iter.cloned().sum()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("data", &self.data())
            .field("grad", &self.grad())
            .field("operation", &self.operation())
            .field("label", &self.label())
            .field(
                "producers",
                &self.producers().iter().map(|x| x.data()).collect::<Vec<f64>>(),
            )
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(data={}, grad={})", self.data(), self.grad())
    }
}
