use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type TyRef = Rc<Ty>;

/// Canonical type descriptor. Descriptors are interned: two structurally
/// equal shapes are the same `Rc` instance for the life of one compilation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Int,
    Char,
    Bool,
    /// The "no type" of procedures; also the pointee of the untyped runtime
    /// pointer accepted by DIM/DOFS.
    Null,
    /// Internal only: open-array parameters and runtime pointers. User
    /// syntax never spells a pointer type.
    Ptr(TyRef),
    /// `None` element count marks an open dimension.
    Array(Option<usize>, TyRef),
}

impl Ty {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Ty::Int | Ty::Char | Ty::Bool | Ty::Ptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Ty::Array(_, _))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int)
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Ty::Char)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Ty::Bool)
    }

    /// Structural compatibility. Open arrays match any array of the same
    /// element type and rank; a pointer matches an array through open-array
    /// decay at call boundaries; `Ptr(Null)` matches any pointer or array.
    pub fn matches(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Int, Ty::Int)
            | (Ty::Char, Ty::Char)
            | (Ty::Bool, Ty::Bool)
            | (Ty::Null, Ty::Null) => true,
            (Ty::Ptr(a), _) if **a == Ty::Null => other.is_pointer() || other.is_array(),
            (_, Ty::Ptr(b)) if **b == Ty::Null => self.is_pointer() || self.is_array(),
            (Ty::Ptr(a), Ty::Ptr(b)) => a.matches(b),
            (Ty::Ptr(a), Ty::Array(_, _)) => a.matches(other),
            (Ty::Array(_, _), Ty::Ptr(b)) => self.matches(b),
            (Ty::Array(na, ea), Ty::Array(nb, eb)) => {
                (na.is_none() || nb.is_none() || na == nb) && ea.matches(eb)
            }
            _ => false,
        }
    }

    /// Element type one indexing step in, peeling a leading pointer first
    /// (open-array parameters index like the arrays they point at).
    pub fn inner(&self) -> Option<TyRef> {
        match self {
            Ty::Ptr(t) | Ty::Array(_, t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Number of array dimensions (0 for scalars).
    pub fn ndim(&self) -> usize {
        match self {
            Ty::Array(_, t) => 1 + t.ndim(),
            _ => 0,
        }
    }

    /// The scalar element type at the bottom of an array nest.
    pub fn base_elem(&self) -> &Ty {
        match self {
            Ty::Array(_, t) => t.base_elem(),
            t => t,
        }
    }

    /// Raw size of a value of this type, without the array dimension header.
    pub fn data_size(&self) -> usize {
        match self {
            Ty::Int | Ty::Ptr(_) => 4,
            Ty::Char | Ty::Bool => 1,
            Ty::Null => 0,
            Ty::Array(n, t) => n.unwrap_or(0) * t.data_size(),
        }
    }

    /// In-memory size. Arrays are prefixed by a dimension header of
    /// `4 * (ndim + 1)` bytes (dimension count plus one extent word each).
    pub fn size(&self) -> usize {
        match self {
            Ty::Array(_, _) => 4 * (self.ndim() + 1) + self.data_size(),
            _ => self.data_size(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            Ty::Int | Ty::Ptr(_) | Ty::Array(_, _) => 4,
            Ty::Char | Ty::Bool => 1,
            Ty::Null => 1,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => write!(f, "integer"),
            Ty::Char => write!(f, "char"),
            Ty::Bool => write!(f, "boolean"),
            Ty::Null => write!(f, "<null>"),
            Ty::Ptr(t) => write!(f, "ptr to {}", t),
            Ty::Array(Some(n), t) => write!(f, "{}[{}]", t, n),
            Ty::Array(None, t) => write!(f, "{}[]", t),
        }
    }
}

/// Per-compilation intern table. Interning never fails and is idempotent:
/// equal shapes always come back as the same reference.
#[derive(Debug, Default)]
pub struct TypeInterner {
    table: RefCell<HashMap<Ty, TyRef>>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, ty: Ty) -> TyRef {
        let mut table = self.table.borrow_mut();
        if let Some(t) = table.get(&ty) {
            return t.clone();
        }
        let t = Rc::new(ty.clone());
        table.insert(ty, t.clone());
        t
    }

    pub fn int(&self) -> TyRef {
        self.intern(Ty::Int)
    }

    pub fn char(&self) -> TyRef {
        self.intern(Ty::Char)
    }

    pub fn boolean(&self) -> TyRef {
        self.intern(Ty::Bool)
    }

    pub fn null(&self) -> TyRef {
        self.intern(Ty::Null)
    }

    pub fn pointer(&self, base: TyRef) -> TyRef {
        self.intern(Ty::Ptr(base))
    }

    pub fn array(&self, count: Option<usize>, elem: TyRef) -> TyRef {
        self.intern(Ty::Array(count, elem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let tm = TypeInterner::new();
        let a = tm.array(Some(5), tm.int());
        let b = tm.array(Some(5), tm.int());
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&tm.int(), &tm.int()));
    }

    #[test]
    fn concrete_arrays_require_equal_dimensions() {
        let tm = TypeInterner::new();
        let a5 = tm.array(Some(5), tm.int());
        let a7 = tm.array(Some(7), tm.int());
        assert!(!a5.matches(&a7));
        assert!(a5.matches(&a5));
    }

    #[test]
    fn open_array_matches_any_extent() {
        let tm = TypeInterner::new();
        let open = tm.array(None, tm.int());
        let a7 = tm.array(Some(7), tm.int());
        assert!(open.matches(&a7));
        assert!(a7.matches(&open));
        assert!(!open.matches(&tm.array(Some(7), tm.char())));
    }

    #[test]
    fn open_array_parameter_decays_from_concrete_argument() {
        let tm = TypeInterner::new();
        let param = tm.pointer(tm.array(None, tm.char()));
        let arg = tm.array(Some(12), tm.char());
        assert!(param.matches(&arg));
        assert!(!param.matches(&tm.array(Some(12), tm.int())));
    }

    #[test]
    fn untyped_runtime_pointer_matches_arrays() {
        let tm = TypeInterner::new();
        let any = tm.pointer(tm.null());
        assert!(any.matches(&tm.array(Some(3), tm.int())));
        assert!(any.matches(&tm.pointer(tm.array(None, tm.char()))));
        assert!(!any.matches(&tm.int()));
    }

    #[test]
    fn sizes_include_dimension_header() {
        let tm = TypeInterner::new();
        let a = tm.array(Some(5), tm.array(Some(4), tm.int()));
        assert_eq!(a.ndim(), 2);
        assert_eq!(a.data_size(), 80);
        assert_eq!(a.size(), 12 + 80);
        assert_eq!(tm.char().size(), 1);
    }
}
