//! Static tables of Python builtin function and type names.
//!
//! Calls and attribute reads on names that were never imported only
//! contribute records when the name is a known builtin; everything else is
//! assumed to be project-local noise.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Builtin functions reachable without an import.
pub fn builtin_function_set() -> &'static HashSet<&'static str> {
    static FUNCS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    FUNCS.get_or_init(|| {
        [
            "abs",
            "aiter",
            "all",
            "anext",
            "any",
            "ascii",
            "bin",
            "breakpoint",
            "callable",
            "chr",
            "compile",
            "delattr",
            "dir",
            "divmod",
            "eval",
            "exec",
            "exit",
            "format",
            "getattr",
            "globals",
            "hasattr",
            "hash",
            "help",
            "hex",
            "id",
            "input",
            "isinstance",
            "issubclass",
            "iter",
            "len",
            "locals",
            "max",
            "min",
            "next",
            "oct",
            "open",
            "ord",
            "pow",
            "print",
            "quit",
            "repr",
            "round",
            "setattr",
            "sorted",
            "sum",
            "vars",
            "__import__",
        ]
        .into_iter()
        .collect()
    })
}

/// Builtin types and exception classes reachable without an import.
pub fn builtin_type_set() -> &'static HashSet<&'static str> {
    static TYPES: OnceLock<HashSet<&'static str>> = OnceLock::new();
    TYPES.get_or_init(|| {
        [
            "bool",
            "bytearray",
            "bytes",
            "classmethod",
            "complex",
            "dict",
            "enumerate",
            "filter",
            "float",
            "frozenset",
            "int",
            "list",
            "map",
            "memoryview",
            "object",
            "property",
            "range",
            "reversed",
            "set",
            "slice",
            "staticmethod",
            "str",
            "super",
            "tuple",
            "type",
            "zip",
            "ArithmeticError",
            "AssertionError",
            "AttributeError",
            "BaseException",
            "BlockingIOError",
            "BrokenPipeError",
            "BufferError",
            "ChildProcessError",
            "ConnectionAbortedError",
            "ConnectionError",
            "ConnectionRefusedError",
            "ConnectionResetError",
            "EOFError",
            "EnvironmentError",
            "Exception",
            "FileExistsError",
            "FileNotFoundError",
            "FloatingPointError",
            "GeneratorExit",
            "IOError",
            "ImportError",
            "IndentationError",
            "IndexError",
            "InterruptedError",
            "IsADirectoryError",
            "KeyError",
            "KeyboardInterrupt",
            "LookupError",
            "MemoryError",
            "ModuleNotFoundError",
            "NameError",
            "NotADirectoryError",
            "NotImplementedError",
            "OSError",
            "OverflowError",
            "PermissionError",
            "ProcessLookupError",
            "RecursionError",
            "ReferenceError",
            "RuntimeError",
            "StopAsyncIteration",
            "StopIteration",
            "SyntaxError",
            "SystemError",
            "SystemExit",
            "TabError",
            "TimeoutError",
            "TypeError",
            "UnboundLocalError",
            "UnicodeDecodeError",
            "UnicodeEncodeError",
            "UnicodeError",
            "UnicodeTranslateError",
            "ValueError",
            "ZeroDivisionError",
        ]
        .into_iter()
        .collect()
    })
}

/// True when `name` is a builtin function or type.
pub fn is_builtin(name: &str) -> bool {
    builtin_function_set().contains(name) || builtin_type_set().contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_builtins_are_present() {
        assert!(is_builtin("eval"));
        assert!(is_builtin("exec"));
        assert!(is_builtin("open"));
        assert!(is_builtin("str"));
    }

    #[test]
    fn project_names_are_not_builtins() {
        assert!(!is_builtin("get_db"));
        assert!(!is_builtin("request"));
    }
}
