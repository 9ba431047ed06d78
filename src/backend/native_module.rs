//! Source of the module the Cython backend actually builds.
//!
//! The staged unit imports its siblings from the host module. Here those
//! imports become stubs that call back into the dispatcher's link table, and a
//! C ABI layer is appended: `cyc_module_init`, which starts (or joins) the
//! embedded interpreter and imports the artifact as a module, and one
//! `cyc_entry_<function>` matching the loader's native entry signature.

use std::fmt::Write as _;

use cycompile_ffi::abi::{entry_symbol, INIT_SYMBOL};
use cycompile_source::TranslationUnit;

const PRELUDE: &str = r#"import sys as _cyc_sys
from cpython.mem cimport PyMem_Malloc, PyMem_Free

cdef extern from *:
    """
    #if defined(_MSC_VER)
    #define CYC_THREAD_LOCAL __declspec(thread)
    #else
    #define CYC_THREAD_LOCAL _Thread_local
    #endif

    typedef struct {
        unsigned char kind;
        long long int_value;
        double float_value;
    } cyc_value;

    typedef int (*cyc_link)(const void *ctx, const char *name,
                            const cyc_value *argv, size_t argc, cyc_value *out);

    static CYC_THREAD_LOCAL cyc_link cyc_current_link = NULL;
    static CYC_THREAD_LOCAL const void *cyc_current_ctx = NULL;

    static void cyc_swap_link(cyc_link *link, const void **ctx) {
        cyc_link previous_link = cyc_current_link;
        const void *previous_ctx = cyc_current_ctx;
        cyc_current_link = *link;
        cyc_current_ctx = *ctx;
        *link = previous_link;
        *ctx = previous_ctx;
    }

    static int cyc_invoke_link(const char *name, const cyc_value *argv,
                               size_t argc, cyc_value *out) {
        if (cyc_current_link == NULL) {
            return -1;
        }
        return cyc_current_link(cyc_current_ctx, name, argv, argc, out);
    }

    static int cyc_boot(const char *directory, const char *module) {
        PyGILState_STATE gil;
        PyObject *path;
        PyObject *entry;
        PyObject *imported;
        int present;
        int status = 0;

        if (!Py_IsInitialized()) {
            Py_InitializeEx(0);
            PyEval_SaveThread();
        }
        gil = PyGILState_Ensure();
        path = PySys_GetObject("path");
        entry = PyUnicode_DecodeFSDefault(directory);
        if (path == NULL || entry == NULL) {
            status = -1;
        } else {
            present = PySequence_Contains(path, entry);
            if (present < 0 || (present == 0 && PyList_Insert(path, 0, entry) != 0)) {
                status = -1;
            }
        }
        Py_XDECREF(entry);
        if (status == 0) {
            imported = PyImport_ImportModule(module);
            if (imported == NULL) {
                status = -1;
            } else {
                Py_DECREF(imported);
            }
        }
        if (status != 0 && PyErr_Occurred()) {
            PyErr_Print();
        }
        PyGILState_Release(gil);
        return status;
    }
    """
    ctypedef struct cyc_value:
        unsigned char kind
        long long int_value
        double float_value
    ctypedef int (*cyc_link)(const void *ctx, const char *name, const cyc_value *argv, size_t argc, cyc_value *out) noexcept nogil
    void cyc_swap_link(cyc_link *link, const void **ctx) noexcept nogil
    int cyc_invoke_link(const char *name, const cyc_value *argv, size_t argc, cyc_value *out) noexcept nogil
    int cyc_boot(const char *directory, const char *module) noexcept nogil


cdef object _cyc_to_py(const cyc_value *value):
    if value.kind == 1:
        return value.int_value != 0
    if value.kind == 2:
        return value.int_value
    if value.kind == 3:
        return value.float_value
    return None


cdef int _cyc_from_py(object obj, cyc_value *value) except -1:
    value.kind = 0
    value.int_value = 0
    value.float_value = 0.0
    if obj is None:
        return 0
    if isinstance(obj, bool):
        value.kind = 1
        value.int_value = 1 if obj else 0
    elif isinstance(obj, int):
        value.kind = 2
        value.int_value = obj
    elif isinstance(obj, float):
        value.kind = 3
        value.float_value = obj
    else:
        raise TypeError(f"{type(obj).__name__} cannot cross the native boundary")
    return 0


def _cyc_call_link(bytes name, tuple args):
    cdef Py_ssize_t argc = len(args)
    cdef Py_ssize_t i
    cdef int status = 0
    cdef cyc_value out
    cdef const char *cname = name
    cdef cyc_value *argv = <cyc_value *> PyMem_Malloc((argc if argc > 0 else 1) * sizeof(cyc_value))
    if argv == NULL:
        raise MemoryError()
    try:
        for i in range(argc):
            _cyc_from_py(args[i], &argv[i])
        with nogil:
            status = cyc_invoke_link(cname, argv, <size_t> argc, &out)
    finally:
        PyMem_Free(argv)
    if status != 0:
        raise RuntimeError(f"call to {name.decode()} failed with status {status}")
    return _cyc_to_py(&out)


cdef int _cyc_dispatch(object function, const cyc_value *argv, size_t argc, cyc_value *out, cyc_link link, const void *ctx) noexcept:
    cdef cyc_link saved_link = link
    cdef const void *saved_ctx = ctx
    cdef size_t i
    cyc_swap_link(&saved_link, &saved_ctx)
    try:
        args = []
        for i in range(argc):
            args.append(_cyc_to_py(&argv[i]))
        _cyc_from_py(function(*args), out)
        return 0
    except BaseException as exc:
        _cyc_sys.excepthook(type(exc), exc, exc.__traceback__)
        return 1
    finally:
        cyc_swap_link(&saved_link, &saved_ctx)
"#;

/// Full source handed to `cython` for `unit`.
pub fn native_module_source(unit: &TranslationUnit) -> String {
    let mut source = String::new();
    for import in &unit.imports {
        source.push_str(import);
        source.push('\n');
    }
    source.push('\n');
    source.push_str(PRELUDE);

    for sibling in &unit.siblings {
        let _ = write!(
            source,
            "\n\ndef {sibling}(*args):\n    return _cyc_call_link(b\"{sibling}\", args)\n"
        );
    }

    source.push_str("\n\n");
    source.push_str(&unit.body);
    source.push_str("\n\n\n");

    let _ = write!(
        source,
        "cdef public int {INIT_SYMBOL}(const char *directory, const char *module) noexcept nogil:\n    \
         return cyc_boot(directory, module)\n\n\n\
         cdef public int {entry}(const cyc_value *argv, size_t argc, cyc_value *out, cyc_link link, const void *ctx) noexcept nogil:\n    \
         with gil:\n        \
         return _cyc_dispatch({function}, argv, argc, out, link, ctx)\n",
        entry = entry_symbol(&unit.function),
        function = unit.function,
    );
    source
}

/// Symbols the linker must export where nothing is exported by default.
pub fn exported_symbols(unit: &TranslationUnit) -> [String; 2] {
    [INIT_SYMBOL.to_string(), entry_symbol(&unit.function)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> TranslationUnit {
        TranslationUnit {
            function: "is_even".into(),
            module: "app".into(),
            imports: vec!["import math".into()],
            siblings: vec!["is_odd".into()],
            body: "def is_even(n):\n    if n == 0:\n        return True\n    return is_odd(n - 1)"
                .into(),
        }
    }

    #[test]
    fn sibling_imports_become_link_stubs() {
        let source = native_module_source(&unit());

        assert!(!source.contains("from app import"));
        assert!(source.contains("def is_odd(*args):\n    return _cyc_call_link(b\"is_odd\", args)"));
        assert!(source.starts_with("import math\n"));
        assert!(source.contains(&unit().body));
    }

    #[test]
    fn entry_points_follow_the_loader_naming() {
        let source = native_module_source(&unit());

        assert!(source.contains("cdef public int cyc_entry_is_even(const cyc_value *argv"));
        assert!(source.contains("cdef public int cyc_module_init(const char *directory"));
        assert!(source.contains("return _cyc_dispatch(is_even, argv"));
        assert_eq!(
            exported_symbols(&unit()),
            ["cyc_module_init".to_string(), "cyc_entry_is_even".to_string()]
        );
    }

    #[test]
    fn stubs_are_defined_before_the_body() {
        let source = native_module_source(&unit());
        let stub = source.find("def is_odd(").unwrap_or(usize::MAX);
        let body = source.find("def is_even(").unwrap_or(0);
        assert!(stub < body);
    }
}
