//
// env/globals.rs
//
// Ambient globals every document can use without importing anything
//

pub const GLOBALS_PATH: &str = "/globals.d.ts";

pub const GLOBALS_SOURCE: &str = r#"interface BinaryFile {
    fileName?: string;
    fileExtension?: string;
    mimeType: string;
    fileSize?: string;
    data: string;
}

interface Item<J = Record<string, any>> {
    json: J;
    binary?: Record<string, BinaryFile>;
}

interface NodeInput {
    all(): Item[];
    first(): Item;
    last(): Item;
    item: Item;
}

/** Names of nodes referenced from this document, augmented per node */
interface NodeReferences {}

interface NodeReference<J = Record<string, any>> {
    all(): Item<J>[];
    first(): Item<J>;
    last(): Item<J>;
    item: Item<J>;
    params: Record<string, any>;
    isExecuted: boolean;
}

interface Console {
    log(...data: any[]): void;
    info(...data: any[]): void;
    warn(...data: any[]): void;
    error(...data: any[]): void;
}

/** Output channel of the sandbox */
declare var console: Console;

/** JSON data of the current item */
declare const $json: Record<string, any>;

/** Binary data of the current item */
declare const $binary: Record<string, BinaryFile>;

/** Input data of the current node */
declare const $input: NodeInput;

/** Index of the current item */
declare const $itemIndex: number;

/** Access the output of another node by name */
declare function $<K extends keyof NodeReferences>(name: K): NodeReference<NodeReferences[K]>;
"#;
