//! # SimGrid 运行器
//!
//! 命令行程序的库部分: 应用组装、批次文件加载与优雅关闭。

pub mod app;
pub mod batch;
pub mod shutdown;
