mod invoker;

pub use invoker::SystemToolInvoker;
