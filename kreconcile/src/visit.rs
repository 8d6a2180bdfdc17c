use std::ops::ControlFlow;

use serde_yaml::{Mapping, Sequence, Value};

pub trait VisitorMut {
    type Break;

    fn visit_value(&mut self, node: &mut Value) -> ControlFlow<Self::Break> {
        self.walk_value(node)
    }

    fn visit_mapping(&mut self, map: &mut Mapping) -> ControlFlow<Self::Break> {
        self.walk_mapping(map)
    }

    fn visit_sequence(&mut self, seq: &mut Sequence) -> ControlFlow<Self::Break> {
        self.walk_sequence(seq)
    }

    fn visit_string(&mut self, _s: &mut String) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    fn walk_mapping(&mut self, map: &mut Mapping) -> ControlFlow<Self::Break> {
        for value in map.values_mut() {
            // No mutable reference to the key
            self.visit_value(value)?;
        }

        ControlFlow::Continue(())
    }

    fn walk_sequence(&mut self, seq: &mut Sequence) -> ControlFlow<Self::Break> {
        for item in seq.iter_mut() {
            self.visit_value(item)?;
        }

        ControlFlow::Continue(())
    }

    fn walk_value(&mut self, node: &mut Value) -> ControlFlow<Self::Break> {
        match node {
            Value::Null | Value::Bool(_) | Value::Number(_) => ControlFlow::Continue(()),
            Value::String(s) => self.visit_string(s),
            Value::Tagged(tagged) => self.visit_value(&mut tagged.value),
            Value::Sequence(seq) => self.visit_sequence(seq),
            Value::Mapping(map) => self.visit_mapping(map),
        }
    }
}

pub trait VisitMut {
    fn visit_with<V: VisitorMut>(&mut self, visitor: &mut V) -> ControlFlow<V::Break>;
}

impl VisitMut for Value {
    fn visit_with<V: VisitorMut>(&mut self, visitor: &mut V) -> ControlFlow<V::Break> {
        visitor.visit_value(self)
    }
}

impl VisitMut for Mapping {
    fn visit_with<V: VisitorMut>(&mut self, visitor: &mut V) -> ControlFlow<V::Break> {
        visitor.visit_mapping(self)
    }
}
